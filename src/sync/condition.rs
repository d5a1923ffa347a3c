//! Condition variable paired with a [`Mutex`]
//!
//! The native `parking_lot::Condvar` only cooperates with its own mutex, so
//! waiting goes through an internal gate lock: the waiter takes the gate,
//! releases the user mutex and sleeps on the gate. A signaller must take the
//! gate too, which it cannot do until the waiter is parked, so a
//! mutate-then-signal producer never loses a wakeup.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Condvar;

use super::mutex::{Mutex, MutexGuard};
use super::policy::{unprivileged, LockPolicy};
use crate::error::contract_violation;
use crate::logging::log_main_thread_wait;

pub struct Condition<T: ?Sized = ()> {
    gate: parking_lot::Mutex<()>,
    cvar: Condvar,
    mutex: Mutex<T>,
}

impl<T> Condition<T> {
    pub fn new(value: T) -> Self {
        Self::with_policy(value, unprivileged())
    }

    pub fn with_policy(value: T, policy: Arc<dyn LockPolicy>) -> Self {
        Self {
            gate: parking_lot::Mutex::new(()),
            cvar: Condvar::new(),
            mutex: Mutex::with_policy(value, policy),
        }
    }

    pub fn into_inner(self) -> T {
        self.mutex.into_inner()
    }
}

impl<T: ?Sized> Condition<T> {
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.mutex.lock()
    }

    #[inline]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.mutex.try_lock()
    }

    /// The mutex half of the pair
    #[inline]
    pub fn mutex(&self) -> &Mutex<T> {
        &self.mutex
    }

    /// Release the lock, sleep until signalled, then re-acquire.
    ///
    /// Spurious wakeups are possible; re-check the predicate in a loop or
    /// use [`wait_while`](Self::wait_while).
    #[track_caller]
    pub fn wait(&self, guard: &mut MutexGuard<'_, T>) {
        if !std::ptr::eq(MutexGuard::mutex(guard), &self.mutex) {
            contract_violation("condition waited on with a guard of another mutex");
        }
        if self.mutex.policy().is_main_thread() {
            self.wait_main();
        } else {
            self.wait_inner();
        }
    }

    /// Wait until `condition` returns false
    pub fn wait_while<F>(&self, guard: &mut MutexGuard<'_, T>, mut condition: F)
    where
        F: FnMut(&T) -> bool,
    {
        while condition(&**guard) {
            self.wait(guard);
        }
    }

    /// Wake one waiter
    pub fn signal(&self) {
        let _gate = self.gate.lock();
        self.cvar.notify_one();
    }

    /// Wake all waiters
    pub fn broadcast(&self) {
        let _gate = self.gate.lock();
        self.cvar.notify_all();
    }

    fn wait_inner(&self) {
        let mut gate = self.gate.lock();
        let depth = self.mutex.release_for_wait();
        self.cvar.wait(&mut gate);
        drop(gate);
        self.mutex.reacquire_after_wait(depth);
    }

    /// Blocking the main thread is worth recording
    #[cold]
    #[inline(never)]
    fn wait_main(&self) {
        let start = Instant::now();
        self.wait_inner();
        let blocked = start.elapsed();

        self.mutex.stats().record_main_wait(blocked.as_micros() as u64);
        log_main_thread_wait(blocked, self.mutex.policy().slow_wait_threshold());
    }
}

impl<T: Default> Default for Condition<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Condition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition").field("mutex", &&self.mutex).finish()
    }
}
