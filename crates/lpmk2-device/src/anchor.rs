//! Registry of OUT transfers in flight, supporting cancel-all.

use std::collections::BTreeSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use lpmk2_transport::{TransferId, Transport};
use tracing::debug;

use crate::interrupt::wait_until_clear;

#[derive(Debug, Default)]
pub(crate) struct Anchor {
    inflight: Mutex<BTreeSet<TransferId>>,
    drained: Condvar,
}

impl Anchor {
    fn inflight(&self) -> MutexGuard<'_, BTreeSet<TransferId>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn anchor(&self, id: TransferId) {
        self.inflight().insert(id);
    }

    pub(crate) fn unanchor(&self, id: TransferId) {
        let mut inflight = self.inflight();
        inflight.remove(&id);
        if inflight.is_empty() {
            self.drained.notify_all();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.inflight().len()
    }

    /// Cancel every anchored transfer and wait until all completions ran.
    ///
    /// Callers must make sure no new transfers get anchored meanwhile.
    pub(crate) fn kill_all(&self, transport: &dyn Transport) {
        let ids: Vec<TransferId> = self.inflight().iter().copied().collect();
        if !ids.is_empty() {
            debug!(count = ids.len(), "cancelling in-flight writes");
        }
        for id in ids {
            transport.cancel(id);
        }
        let inflight = self.inflight();
        drop(wait_until_clear(&self.drained, inflight, |set| !set.is_empty()));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use bytes::Bytes;
    use lpmk2_transport::{Completion, Result};

    use super::*;

    /// Transport whose cancellations complete on a background thread.
    struct SlowCancel {
        anchor: Arc<Anchor>,
    }

    impl Transport for SlowCancel {
        fn submit_in(&self, _: TransferId, _: u8, _: usize, _: Completion) -> Result<()> {
            Ok(())
        }

        fn submit_out(&self, _: TransferId, _: u8, _: Bytes, _: Completion) -> Result<()> {
            Ok(())
        }

        fn cancel(&self, id: TransferId) {
            let anchor = Arc::clone(&self.anchor);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                anchor.unanchor(id);
            });
        }
    }

    #[test]
    fn kill_all_waits_for_every_completion() {
        let anchor = Arc::new(Anchor::default());
        anchor.anchor(TransferId(1));
        anchor.anchor(TransferId(2));
        anchor.anchor(TransferId(3));
        assert_eq!(anchor.len(), 3);

        let transport = SlowCancel {
            anchor: Arc::clone(&anchor),
        };
        anchor.kill_all(&transport);
        assert_eq!(anchor.len(), 0);
    }

    #[test]
    fn kill_all_on_empty_returns() {
        let anchor = Anchor::default();
        let transport = SlowCancel {
            anchor: Arc::new(Anchor::default()),
        };
        anchor.kill_all(&transport);
        assert_eq!(anchor.len(), 0);
    }

    #[test]
    fn unanchor_unknown_is_harmless() {
        let anchor = Anchor::default();
        anchor.anchor(TransferId(4));
        anchor.unanchor(TransferId(5));
        assert_eq!(anchor.len(), 1);
    }
}
