//! In-memory transport that stands in for the device.
//!
//! Reads complete as soon as inbound data is available, writes are recorded
//! and either completed inline or held until released. Completions always run
//! outside the simulator's own lock.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::{Completion, Transfer, TransferId, TransferStatus, Transport};

struct PendingIn {
    id: TransferId,
    capacity: usize,
    completion: Completion,
}

struct PendingOut {
    id: TransferId,
    completion: Completion,
}

#[derive(Default)]
struct SimState {
    inbound: VecDeque<Bytes>,
    pending_in: VecDeque<PendingIn>,
    pending_out: Vec<PendingOut>,
    hold_writes: bool,
    write_status: Option<TransferStatus>,
    reject_next: Option<TransportError>,
    written: Vec<(u8, Bytes)>,
    in_submissions: usize,
    out_submissions: usize,
    peak_pending_in: usize,
}

/// Simulated bulk endpoint pair.
#[derive(Default)]
pub struct SimTransport {
    state: Mutex<SimState>,
}

impl SimTransport {
    /// A simulator that completes writes immediately.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Keep OUT transfers in flight until [`release_writes`](Self::release_writes).
    pub fn hold_writes(&self, hold: bool) {
        self.state().hold_writes = hold;
    }

    /// Status reported by the next OUT completion, then back to `Completed`.
    pub fn fail_next_write(&self, status: TransferStatus) {
        self.state().write_status = Some(status);
    }

    /// Make the next submission of either direction fail with `err`.
    pub fn reject_next_submission(&self, err: TransportError) {
        self.state().reject_next = Some(err);
    }

    /// Deliver one chunk the device sent. Completes the oldest pending read,
    /// or queues the chunk for the next one.
    pub fn push_inbound(&self, data: impl Into<Bytes>) {
        let data = data.into();
        let ready = {
            let mut state = self.state();
            match state.pending_in.pop_front() {
                Some(pending) => Some((pending, data)),
                None => {
                    state.inbound.push_back(data);
                    None
                }
            }
        };
        if let Some((pending, data)) = ready {
            complete_in(pending, data);
        }
    }

    /// Finish the oldest pending read with a failure status.
    ///
    /// Returns false when no read was pending.
    pub fn fail_read(&self, status: TransferStatus) -> bool {
        let pending = self.state().pending_in.pop_front();
        match pending {
            Some(pending) => {
                (pending.completion)(Transfer {
                    id: pending.id,
                    status,
                    data: Bytes::new(),
                });
                true
            }
            None => false,
        }
    }

    /// Complete every held OUT transfer with `status`. Returns how many ran.
    pub fn release_writes(&self, status: TransferStatus) -> usize {
        let pending = std::mem::take(&mut self.state().pending_out);
        let released = pending.len();
        for write in pending {
            (write.completion)(Transfer {
                id: write.id,
                status,
                data: Bytes::new(),
            });
        }
        released
    }

    /// Frames written so far, in submission order.
    pub fn written(&self) -> Vec<Bytes> {
        self.state()
            .written
            .iter()
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Endpoint addresses the written frames were sent to.
    pub fn written_endpoints(&self) -> Vec<u8> {
        self.state().written.iter().map(|(ep, _)| *ep).collect()
    }

    /// Number of accepted IN submissions.
    pub fn in_submissions(&self) -> usize {
        self.state().in_submissions
    }

    /// Number of accepted OUT submissions.
    pub fn out_submissions(&self) -> usize {
        self.state().out_submissions
    }

    /// Whether an IN transfer is waiting for data.
    pub fn has_pending_read(&self) -> bool {
        !self.state().pending_in.is_empty()
    }

    /// Highest number of IN transfers ever pending at the same time.
    pub fn peak_pending_reads(&self) -> usize {
        self.state().peak_pending_in
    }

    /// Number of OUT transfers currently held.
    pub fn pending_writes(&self) -> usize {
        self.state().pending_out.len()
    }
}

fn complete_in(pending: PendingIn, mut data: Bytes) {
    if data.len() > pending.capacity {
        data.truncate(pending.capacity);
    }
    trace!(id = %pending.id, len = data.len(), "sim: completing read");
    (pending.completion)(Transfer {
        id: pending.id,
        status: TransferStatus::Completed,
        data,
    });
}

impl Transport for SimTransport {
    fn submit_in(
        &self,
        id: TransferId,
        _endpoint: u8,
        capacity: usize,
        completion: Completion,
    ) -> Result<()> {
        let pending = PendingIn {
            id,
            capacity,
            completion,
        };
        let ready = {
            let mut state = self.state();
            if let Some(err) = state.reject_next.take() {
                return Err(err);
            }
            if state.pending_in.iter().any(|p| p.id == id) {
                return Err(TransportError::Busy(id.0));
            }
            state.in_submissions += 1;
            match state.inbound.pop_front() {
                Some(data) => Some((pending, data)),
                None => {
                    state.pending_in.push_back(pending);
                    state.peak_pending_in = state.peak_pending_in.max(state.pending_in.len());
                    None
                }
            }
        };
        if let Some((pending, data)) = ready {
            complete_in(pending, data);
        }
        Ok(())
    }

    fn submit_out(
        &self,
        id: TransferId,
        endpoint: u8,
        data: Bytes,
        completion: Completion,
    ) -> Result<()> {
        let immediate = {
            let mut state = self.state();
            if let Some(err) = state.reject_next.take() {
                return Err(err);
            }
            state.out_submissions += 1;
            state.written.push((endpoint, data));
            if state.hold_writes {
                state.pending_out.push(PendingOut { id, completion });
                None
            } else {
                let status = state.write_status.take().unwrap_or(TransferStatus::Completed);
                Some((completion, status))
            }
        };
        if let Some((completion, status)) = immediate {
            completion(Transfer {
                id,
                status,
                data: Bytes::new(),
            });
        }
        Ok(())
    }

    fn cancel(&self, id: TransferId) {
        let (read, write) = {
            let mut state = self.state();
            let read = state
                .pending_in
                .iter()
                .position(|p| p.id == id)
                .and_then(|idx| state.pending_in.remove(idx));
            let write = state
                .pending_out
                .iter()
                .position(|p| p.id == id)
                .map(|idx| state.pending_out.remove(idx));
            (read, write)
        };
        if let Some(read) = read {
            (read.completion)(Transfer {
                id,
                status: TransferStatus::Cancelled,
                data: Bytes::new(),
            });
        }
        if let Some(write) = write {
            (write.completion)(Transfer {
                id,
                status: TransferStatus::Cancelled,
                data: Bytes::new(),
            });
        }
    }

    fn transport_name(&self) -> &'static str {
        "sim"
    }
}
