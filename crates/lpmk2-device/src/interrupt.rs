//! Interruption of suspended waits.
//!
//! A caller blocked in `read` or `write` can be released from another thread
//! by raising the [`Interrupt`] of its handle. The waiting call returns
//! [`DeviceError::Interrupted`] without making the state change it waited for.
//!
//! An interrupt only reaches calls that are running when it is raised. Each
//! call snapshots the token's generation when it starts; a raise seen by a
//! call that never suspends is dropped with that call.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::{DeviceError, Result};

/// Owner of the lock and condvar a caller is parked on.
///
/// `wake` must take that lock before notifying, so that a raise landing
/// between the waiter's check and its park is not lost.
pub(crate) trait Wake: Send + Sync {
    fn wake(&self);
}

#[derive(Default)]
struct Parked {
    next: u64,
    waiters: BTreeMap<u64, Arc<dyn Wake>>,
}

#[derive(Default)]
struct Shared {
    generation: AtomicU64,
    parked: Mutex<Parked>,
}

impl Shared {
    fn parked(&self) -> MutexGuard<'_, Parked> {
        self.parked.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable token that interrupts the calls suspended on it.
#[derive(Clone, Default)]
pub struct Interrupt {
    shared: Arc<Shared>,
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupt")
            .field("generation", &self.generation())
            .field("parked", &self.shared.parked().waiters.len())
            .finish()
    }
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interrupt every call in progress on this token.
    ///
    /// Calls already parked are woken at once; calls that have not suspended
    /// yet give up at their next wait. Calls started afterwards are unaffected.
    pub fn raise(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        let waiters: Vec<Arc<dyn Wake>> = self.shared.parked().waiters.values().cloned().collect();
        for waiter in waiters {
            waiter.wake();
        }
    }

    /// Number of raises so far.
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    fn park(&self, waiter: Arc<dyn Wake>) -> Parking<'_> {
        let mut parked = self.shared.parked();
        let key = parked.next;
        parked.next += 1;
        parked.waiters.insert(key, waiter);
        Parking { interrupt: self, key }
    }
}

/// Registration of one parked waiter; withdrawn on drop.
struct Parking<'a> {
    interrupt: &'a Interrupt,
    key: u64,
}

impl Drop for Parking<'_> {
    fn drop(&mut self) {
        self.interrupt.shared.parked().waiters.remove(&self.key);
    }
}

/// How one call may suspend.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IoContext<'a> {
    pub nonblocking: bool,
    interrupt: &'a Interrupt,
    since: u64,
}

impl<'a> IoContext<'a> {
    /// Start a call; only raises after this point interrupt it.
    pub(crate) fn new(nonblocking: bool, interrupt: &'a Interrupt) -> Self {
        Self {
            nonblocking,
            interrupt,
            since: interrupt.generation(),
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupt.generation() > self.since
    }
}

/// Wait on `signal` while `condition` holds, giving up when the call's
/// interrupt is raised. The condition is checked before the interrupt, so a
/// satisfied wait never reports an interruption.
pub(crate) fn wait_while<'g, T, F, W>(
    signal: &Condvar,
    mut guard: MutexGuard<'g, T>,
    cx: &IoContext<'_>,
    waker: &Arc<W>,
    mut condition: F,
) -> Result<MutexGuard<'g, T>>
where
    F: FnMut(&mut T) -> bool,
    W: Wake + 'static,
{
    if !condition(&mut *guard) {
        return Ok(guard);
    }
    let _parking = cx.interrupt.park(waker.clone());
    while condition(&mut *guard) {
        if cx.interrupted() {
            return Err(DeviceError::Interrupted);
        }
        guard = signal.wait(guard).unwrap_or_else(PoisonError::into_inner);
    }
    Ok(guard)
}

/// Uninterruptible variant used by teardown barriers.
pub(crate) fn wait_until_clear<'g, T, F>(
    signal: &Condvar,
    guard: MutexGuard<'g, T>,
    condition: F,
) -> MutexGuard<'g, T>
where
    F: FnMut(&mut T) -> bool,
{
    signal
        .wait_while(guard, condition)
        .unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;

    #[derive(Default)]
    struct Flag {
        busy: Mutex<bool>,
        signal: Condvar,
    }

    impl Wake for Flag {
        fn wake(&self) {
            drop(self.busy.lock().unwrap());
            self.signal.notify_all();
        }
    }

    fn busy_flag() -> Arc<Flag> {
        let flag = Arc::new(Flag::default());
        *flag.busy.lock().unwrap() = true;
        flag
    }

    #[test]
    fn satisfied_wait_ignores_interrupt() {
        let flag = Arc::new(Flag::default());
        let interrupt = Interrupt::new();
        let cx = IoContext::new(false, &interrupt);
        interrupt.raise();

        let guard = wait_while(&flag.signal, flag.busy.lock().unwrap(), &cx, &flag, |busy| *busy);
        assert!(guard.is_ok());
    }

    #[test]
    fn raise_before_the_call_is_not_seen() {
        let flag = busy_flag();
        let interrupt = Interrupt::new();
        interrupt.raise();
        let cx = IoContext::new(false, &interrupt);

        let remote = Arc::clone(&flag);
        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            *remote.busy.lock().unwrap() = false;
            remote.signal.notify_all();
        });

        let guard = wait_while(&flag.signal, flag.busy.lock().unwrap(), &cx, &flag, |busy| *busy);
        assert!(guard.is_ok());
        releaser.join().unwrap();
    }

    #[test]
    fn raise_wakes_parked_waiter_at_once() {
        let flag = busy_flag();
        let interrupt = Interrupt::new();
        let cx = IoContext::new(false, &interrupt);

        let remote = interrupt.clone();
        let raiser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            let raised_at = Instant::now();
            remote.raise();
            raised_at
        });

        let result = wait_while(&flag.signal, flag.busy.lock().unwrap(), &cx, &flag, |busy| *busy);
        let woken_at = Instant::now();
        assert!(matches!(result, Err(DeviceError::Interrupted)));

        let raised_at = raiser.join().unwrap();
        assert!(woken_at >= raised_at);
        assert_eq!(interrupt.shared.parked().waiters.len(), 0);
    }

    #[test]
    fn raise_with_nobody_parked_is_harmless() {
        let interrupt = Interrupt::new();
        interrupt.raise();
        interrupt.raise();
        assert_eq!(interrupt.generation(), 2);
        assert_eq!(interrupt.shared.parked().waiters.len(), 0);
    }
}
