//! Read channel: one outstanding IN transfer and a drainable inbound buffer.
//!
//! Locking: `ReadShared::state` is the short lock, taken by callers and by
//! transfer completions. The I/O token (`ReadState::busy`) serializes whole
//! read calls and grants access to the `ReadBuffer`; it is acquired under the
//! short lock so that waiting for it can be interrupted.

use std::collections::TryReserveError;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use lpmk2_frame::{decode, stuffed_size, FrameError, HexDump, PACKET_PAYLOAD};
use lpmk2_transport::{Transfer, TransferId, TransferStatus, Transport};
use tracing::{debug, error, trace, warn};

use crate::device::TransferIds;
use crate::error::{DeviceError, Result};
use crate::interrupt::{wait_until_clear, wait_while, IoContext, Wake};

/// Bytes landed by the last IN transfer and how far callers drained them.
///
/// Invariant: `copied <= filled <= data.len()`.
#[derive(Debug)]
pub(crate) struct ReadBuffer {
    data: Vec<u8>,
    filled: usize,
    copied: usize,
}

impl ReadBuffer {
    pub(crate) fn with_capacity(capacity: usize) -> std::result::Result<Self, TryReserveError> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)?;
        data.resize(capacity, 0);
        Ok(Self {
            data,
            filled: 0,
            copied: 0,
        })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn filled(&self) -> usize {
        self.filled
    }

    pub(crate) fn copied(&self) -> usize {
        self.copied
    }

    pub(crate) fn leftover(&self) -> usize {
        self.filled - self.copied
    }

    fn reset(&mut self) {
        self.filled = 0;
        self.copied = 0;
    }

    fn land(&mut self, data: &[u8]) {
        let len = data.len().min(self.data.len());
        self.data[..len].copy_from_slice(&data[..len]);
        self.filled = len;
        self.copied = 0;
    }

    /// Decode leftover packets into `out`, advancing `copied` by whole packets.
    fn drain(&mut self, out: &mut [u8]) -> std::result::Result<usize, FrameError> {
        let step = decode(&self.data[self.copied..self.filled], out)?;
        self.copied += step.consumed;
        Ok(step.produced)
    }

    fn discard(&mut self) {
        self.copied = self.filled;
    }
}

#[derive(Debug, Default)]
pub(crate) struct ReadState {
    busy: bool,
    requested: bool,
    inflight: Option<TransferId>,
    error: Option<TransferStatus>,
    landed: Option<Bytes>,
    pub(crate) disconnected: bool,
}

#[derive(Debug)]
struct ReadShared {
    state: Mutex<ReadState>,
    signal: Condvar,
}

impl ReadShared {
    fn state(&self) -> MutexGuard<'_, ReadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, transfer: Transfer) {
        let mut state = self.state();
        if state.inflight != Some(transfer.id) {
            warn!(id = %transfer.id, "ignoring completion of unknown read transfer");
            return;
        }

        if transfer.status.is_ok() {
            debug!(id = %transfer.id, len = transfer.actual_length(), "read transfer completed");
            trace!(data = %HexDump(&transfer.data), "mk2 read (raw)");
            state.landed = Some(transfer.data);
        } else {
            if !transfer.status.is_teardown() {
                error!(
                    id = %transfer.id,
                    status = ?transfer.status,
                    "nonzero read bulk status received"
                );
            }
            state.error = Some(transfer.status);
        }

        state.requested = false;
        state.inflight = None;
        drop(state);
        self.signal.notify_all();
    }
}

impl Wake for ReadShared {
    fn wake(&self) {
        drop(self.state());
        self.signal.notify_all();
    }
}

/// Exclusive right to run a read call; released on drop.
struct IoToken<'a> {
    shared: &'a ReadShared,
}

impl Drop for IoToken<'_> {
    fn drop(&mut self) {
        self.shared.state().busy = false;
        self.shared.signal.notify_all();
    }
}

pub(crate) struct ReadChannel {
    endpoint: u8,
    transport: Arc<dyn Transport>,
    ids: Arc<TransferIds>,
    buffer: Mutex<ReadBuffer>,
    shared: Arc<ReadShared>,
}

impl ReadChannel {
    pub(crate) fn new(
        endpoint: u8,
        buffer: ReadBuffer,
        transport: Arc<dyn Transport>,
        ids: Arc<TransferIds>,
    ) -> Self {
        Self {
            endpoint,
            transport,
            ids,
            buffer: Mutex::new(buffer),
            shared: Arc::new(ReadShared {
                state: Mutex::new(ReadState::default()),
                signal: Condvar::new(),
            }),
        }
    }

    pub(crate) fn endpoint(&self) -> u8 {
        self.endpoint
    }

    /// The short lock; the disconnect procedure sets `disconnected` under it.
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, ReadState> {
        self.shared.state()
    }

    fn lock_io(&self, cx: &IoContext<'_>) -> Result<IoToken<'_>> {
        let mut state = self.shared.state();
        if state.disconnected {
            return Err(DeviceError::DeviceGone);
        }
        if state.busy {
            if cx.nonblocking {
                return Err(DeviceError::WouldBlock);
            }
            state = wait_while(&self.shared.signal, state, cx, &self.shared, |s| {
                s.busy && !s.disconnected
            })?;
            if state.disconnected {
                return Err(DeviceError::DeviceGone);
            }
        }
        state.busy = true;
        Ok(IoToken {
            shared: &self.shared,
        })
    }

    /// Fill `out` with destuffed inbound bytes.
    ///
    /// Suspends only while a transfer is outstanding and nothing is buffered.
    /// A call that drains the buffer without filling `out` starts a prefetch
    /// and returns what it has; the prefetched data goes to the next call.
    pub(crate) fn read(&self, out: &mut [u8], cx: &IoContext<'_>) -> Result<usize> {
        if self.shared.state().disconnected {
            return Err(DeviceError::DeviceGone);
        }
        if out.len() < PACKET_PAYLOAD {
            return Err(DeviceError::InvalidArgument(
                "read buffer must hold at least one packet",
            ));
        }

        let _io = self.lock_io(cx)?;
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            let mut state = self.shared.state();
            if state.disconnected {
                return Err(DeviceError::DeviceGone);
            }

            if state.requested {
                if cx.nonblocking {
                    return Err(DeviceError::WouldBlock);
                }
                debug!("waiting for read completion");
                state = wait_while(&self.shared.signal, state, cx, &self.shared, |s| {
                    s.requested && !s.disconnected
                })?;
                if state.disconnected {
                    return Err(DeviceError::DeviceGone);
                }
            }

            // No transfer is outstanding now, so errors and data are settled.
            if let Some(status) = state.error.take() {
                return Err(DeviceError::from_status(status));
            }
            if let Some(data) = state.landed.take() {
                buffer.land(&data);
            }
            drop(state);

            if buffer.leftover() > 0 {
                debug!(
                    filled = buffer.filled(),
                    copied = buffer.copied(),
                    "draining buffered data"
                );
                let produced = match buffer.drain(out) {
                    Ok(produced) => produced,
                    Err(err) => {
                        warn!(error = %err, "discarding malformed inbound transfer");
                        buffer.discard();
                        return Err(DeviceError::ProtocolFault(err));
                    }
                };

                if produced > 0 {
                    if produced < out.len() && buffer.leftover() == 0 {
                        let wanted = stuffed_size(out.len() - produced);
                        if let Err(err) = self.request(&mut buffer, wanted) {
                            warn!(error = %err, "read prefetch not started");
                        }
                    }
                    return Ok(produced);
                }
            }

            self.request(&mut buffer, stuffed_size(out.len()))?;
        }
    }

    /// Start an IN transfer into the (exhausted) buffer.
    ///
    /// `wanted` is the stuffed size the caller still needs; the transfer
    /// always asks for the whole buffer.
    fn request(&self, buffer: &mut ReadBuffer, wanted: usize) -> Result<()> {
        let id = self.ids.next();
        {
            let mut state = self.shared.state();
            if state.disconnected {
                return Err(DeviceError::DeviceGone);
            }
            state.requested = true;
            state.inflight = Some(id);
        }
        buffer.reset();

        debug!(%id, wanted, capacity = buffer.capacity(), "requesting read");
        let shared = Arc::clone(&self.shared);
        let submitted = self.transport.submit_in(
            id,
            self.endpoint,
            buffer.capacity(),
            Box::new(move |transfer| shared.complete(transfer)),
        );

        if let Err(err) = submitted {
            error!(%id, error = %err, "failed submitting read transfer");
            let mut state = self.shared.state();
            state.requested = false;
            state.inflight = None;
            return Err(DeviceError::from_submit(err));
        }
        Ok(())
    }

    /// Teardown barrier: wait for the running read call to leave, cancel the
    /// outstanding transfer and wait for its completion.
    ///
    /// `disconnected` must already be set.
    pub(crate) fn kill(&self) {
        self.shared.signal.notify_all();

        let state = wait_until_clear(&self.shared.signal, self.shared.state(), |s| s.busy);
        let inflight = if state.requested { state.inflight } else { None };
        drop(state);

        if let Some(id) = inflight {
            debug!(%id, "cancelling outstanding read");
            self.transport.cancel(id);
        }

        drop(wait_until_clear(
            &self.shared.signal,
            self.shared.state(),
            |s| s.requested,
        ));
    }

    #[cfg(test)]
    fn buffer_marks(&self) -> (usize, usize) {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        (buffer.filled(), buffer.copied())
    }

    #[cfg(test)]
    fn is_requested(&self) -> bool {
        self.shared.state().requested
    }
}
