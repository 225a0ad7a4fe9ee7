//! Counting admission gate bounding OUT transfers in flight.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::{DeviceError, Result};
use crate::interrupt::{wait_while, IoContext, Wake};

#[derive(Debug)]
struct GateState {
    available: usize,
    closed: bool,
}

#[derive(Debug)]
pub(crate) struct AdmissionGate {
    capacity: usize,
    state: Mutex<GateState>,
    released: Condvar,
}

/// One admission slot; released when dropped.
#[derive(Debug)]
pub(crate) struct Permit {
    gate: Arc<AdmissionGate>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.gate.release();
    }
}

impl AdmissionGate {
    pub(crate) fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            state: Mutex::new(GateState {
                available: capacity,
                closed: false,
            }),
            released: Condvar::new(),
        })
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a slot, suspending until one frees up unless `cx` is non-blocking.
    pub(crate) fn acquire(self: &Arc<Self>, cx: &IoContext<'_>) -> Result<Permit> {
        let mut state = self.state();
        if state.closed {
            return Err(DeviceError::DeviceGone);
        }
        if state.available == 0 {
            if cx.nonblocking {
                return Err(DeviceError::WouldBlock);
            }
            state = wait_while(&self.released, state, cx, self, |s| {
                s.available == 0 && !s.closed
            })?;
            if state.closed {
                return Err(DeviceError::DeviceGone);
            }
        }
        state.available -= 1;
        Ok(Permit {
            gate: Arc::clone(self),
        })
    }

    fn release(&self) {
        let mut state = self.state();
        state.available = (state.available + 1).min(self.capacity);
        drop(state);
        self.released.notify_one();
    }

    /// Refuse all future acquisitions and wake every waiter.
    pub(crate) fn close(&self) {
        self.state().closed = true;
        self.released.notify_all();
    }

    pub(crate) fn available(&self) -> usize {
        self.state().available
    }
}

impl Wake for AdmissionGate {
    fn wake(&self) {
        drop(self.state());
        self.released.notify_all();
    }
}
