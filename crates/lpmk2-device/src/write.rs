//! Write channel: admission-bounded OUT transfers tracked in an anchor.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lpmk2_frame::{encode_to_bytes, HexDump};
use lpmk2_transport::{Transfer, TransferStatus, Transport};
use tracing::{debug, error, trace};

use crate::anchor::Anchor;
use crate::device::TransferIds;
use crate::error::{DeviceError, Result};
use crate::gate::AdmissionGate;
use crate::interrupt::IoContext;

#[derive(Debug)]
struct WriteShared {
    error: Mutex<Option<TransferStatus>>,
    gate: Arc<AdmissionGate>,
    anchor: Anchor,
}

impl WriteShared {
    fn error(&self) -> MutexGuard<'_, Option<TransferStatus>> {
        self.error.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, transfer: &Transfer) {
        if !transfer.status.is_ok() && !transfer.status.is_teardown() {
            error!(
                id = %transfer.id,
                status = ?transfer.status,
                "nonzero write bulk status received"
            );
            *self.error() = Some(transfer.status);
        }
        self.anchor.unanchor(transfer.id);
    }
}

/// Guard over the write I/O lock; holds the channel's `disconnected` flag.
pub(crate) type WriteIo<'a> = MutexGuard<'a, bool>;

pub(crate) struct WriteChannel {
    endpoint: u8,
    transport: Arc<dyn Transport>,
    ids: Arc<TransferIds>,
    io: Mutex<bool>,
    shared: Arc<WriteShared>,
    max_out_len: usize,
}

impl WriteChannel {
    pub(crate) fn new(
        endpoint: u8,
        writes_in_flight: usize,
        max_out_len: usize,
        transport: Arc<dyn Transport>,
        ids: Arc<TransferIds>,
    ) -> Self {
        Self {
            endpoint,
            transport,
            ids,
            io: Mutex::new(false),
            shared: Arc::new(WriteShared {
                error: Mutex::new(None),
                gate: AdmissionGate::new(writes_in_flight),
                anchor: Anchor::default(),
            }),
            max_out_len,
        }
    }

    pub(crate) fn endpoint(&self) -> u8 {
        self.endpoint
    }

    /// The write I/O lock; the disconnect procedure sets the flag under it.
    pub(crate) fn lock_io(&self) -> WriteIo<'_> {
        self.io.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Encode `payload` and queue it as one OUT transfer.
    ///
    /// Payloads longer than `max_out_len` are cut silently; the returned
    /// count is always the caller's full length.
    pub(crate) fn write(&self, payload: &[u8], cx: &IoContext<'_>) -> Result<usize> {
        if *self.lock_io() {
            return Err(DeviceError::DeviceGone);
        }
        if payload.is_empty() {
            return Ok(0);
        }
        let accepted = &payload[..payload.len().min(self.max_out_len)];

        let permit = self.shared.gate.acquire(cx)?;

        if let Some(status) = self.shared.error().take() {
            return Err(DeviceError::from_status(status));
        }

        let frame = encode_to_bytes(accepted)?;
        trace!(data = %HexDump(&frame), "mk2 write (raw)");

        let io = self.lock_io();
        if *io {
            return Err(DeviceError::DeviceGone);
        }

        let id = self.ids.next();
        self.shared.anchor.anchor(id);
        debug!(%id, len = accepted.len(), stuffed = frame.len(), "submitting write");

        let shared = Arc::clone(&self.shared);
        let submitted = self.transport.submit_out(
            id,
            self.endpoint,
            frame,
            Box::new(move |transfer| {
                shared.complete(&transfer);
                drop(permit);
            }),
        );

        if let Err(err) = submitted {
            self.shared.anchor.unanchor(id);
            error!(%id, error = %err, "failed submitting write transfer");
            return Err(DeviceError::from_submit(err));
        }
        drop(io);

        Ok(payload.len())
    }

    /// Refuse new admissions and wake writers waiting for a slot.
    pub(crate) fn close_gate(&self) {
        self.shared.gate.close();
    }

    /// Cancel every in-flight write and wait for their completions.
    pub(crate) fn kill_all(&self) {
        self.shared.anchor.kill_all(self.transport.as_ref());
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.shared.anchor.len()
    }

    pub(crate) fn free_slots(&self) -> usize {
        self.shared.gate.available()
    }
}
