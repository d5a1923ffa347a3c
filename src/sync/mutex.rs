//! Recursive mutex with a main-thread fast path
//!
//! Design: a `parking_lot::RawMutex` plus a record of the holding thread
//! and a recursion depth. Re-entry by the holder only bumps the depth, so
//! the holder record is written exclusively by the thread that has just
//! acquired or is about to release the raw lock.
//!
//! Guards hand out `&T`, never `&mut T`: a re-entered lock may have several
//! live guards on one thread. Use `Cell`/`RefCell` for mutable state.

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ptr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::OnceCell;
use parking_lot::lock_api::RawMutex as _;
use parking_lot::RawMutex;

use super::policy::{unprivileged, LockPolicy};
use crate::atomic::AtomicCounter;
use crate::error::contract_violation;
use crate::logging::log_main_thread_contention;
use crate::thread::ThreadToken;

/// Counters describing how often the main thread had to block
#[derive(Debug, Default)]
pub struct LockStats {
    main_contentions: AtomicCounter<u64>,
    main_waits: AtomicCounter<u64>,
    main_blocked_us: AtomicCounter<u64>,
}

impl LockStats {
    /// Times the main thread found the lock taken and had to block
    pub fn main_contentions(&self) -> u64 {
        self.main_contentions.get()
    }

    /// Times the main thread waited on a condition paired with this lock
    pub fn main_waits(&self) -> u64 {
        self.main_waits.get()
    }

    /// Total microseconds the main thread spent blocked
    pub fn main_blocked_us(&self) -> u64 {
        self.main_blocked_us.get()
    }

    pub(crate) fn record_main_wait(&self, blocked_us: u64) {
        self.main_waits.increment();
        self.main_blocked_us.add(blocked_us);
    }
}

pub struct Mutex<T: ?Sized = ()> {
    raw: RawMutex,
    holder: AtomicU64,
    depth: AtomicUsize,
    policy: Arc<dyn LockPolicy>,
    stats: LockStats,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Mutex without main-thread privileges
    pub fn new(value: T) -> Self {
        Self::with_policy(value, unprivileged())
    }

    pub fn with_policy(value: T, policy: Arc<dyn LockPolicy>) -> Self {
        Self {
            raw: RawMutex::INIT,
            holder: AtomicU64::new(ThreadToken::NONE.as_u64()),
            depth: AtomicUsize::new(0),
            policy,
            stats: LockStats::default(),
            data: UnsafeCell::new(value),
        }
    }

    pub fn into_inner(self) -> T {
        debug_assert!(self.holder().is_none(), "mutex consumed while locked");
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never touched again, so each field with drop
        // glue is read out exactly once. `policy` is the only such field
        // besides `data`.
        unsafe {
            drop(ptr::read(&this.policy));
            ptr::read(&this.data).into_inner()
        }
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Block until the lock is held by the calling thread.
    ///
    /// Re-entry from the holder succeeds immediately.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        if !self.inc_lock_if_recursive() {
            self.acquire_raw();
            self.mark_acquired(1);
        }
        MutexGuard::new(self)
    }

    /// Lock if present; `None` in, `None` out
    pub fn lock_opt(mutex: Option<&Self>) -> Option<MutexGuard<'_, T>> {
        mutex.map(Self::lock)
    }

    /// Non-blocking variant of [`lock`](Self::lock)
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        if self.inc_lock_if_recursive() {
            return Some(MutexGuard::new(self));
        }
        if !self.raw.try_lock() {
            return None;
        }
        self.mark_acquired(1);
        Some(MutexGuard::new(self))
    }

    /// True if some other thread holds the lock
    pub fn is_locked(&self) -> bool {
        if self.is_self_locked() {
            return false;
        }
        if self.raw.try_lock() {
            // SAFETY: acquired just above on this thread.
            unsafe { self.raw.unlock() };
            return false;
        }
        true
    }

    /// True iff the calling thread holds the lock
    #[inline]
    pub fn is_self_locked(&self) -> bool {
        self.holder().is_current()
    }

    #[inline]
    pub fn holder(&self) -> ThreadToken {
        ThreadToken::from_u64(self.holder.load(Ordering::Acquire))
    }

    /// Recursion depth of the current holder (0 when unlocked)
    pub fn depth(&self) -> usize {
        if self.is_self_locked() {
            self.depth.load(Ordering::Relaxed)
        } else {
            0
        }
    }

    pub fn policy(&self) -> &Arc<dyn LockPolicy> {
        &self.policy
    }

    pub fn stats(&self) -> &LockStats {
        &self.stats
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    #[inline]
    fn inc_lock_if_recursive(&self) -> bool {
        if self.is_self_locked() {
            self.depth.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        false
    }

    fn acquire_raw(&self) {
        if self.policy.use_fast_path() {
            if !self.raw.try_lock() {
                self.lock_main();
            }
        } else {
            self.raw.lock();
        }
    }

    /// Blocking acquire for the main thread after a failed probe
    #[cold]
    #[inline(never)]
    fn lock_main(&self) {
        let start = Instant::now();
        self.raw.lock();
        let blocked = start.elapsed();

        self.stats.main_contentions.increment();
        self.stats.main_blocked_us.add(blocked.as_micros() as u64);
        log_main_thread_contention(blocked, self.policy.slow_wait_threshold());
    }

    #[inline]
    fn mark_acquired(&self, depth: usize) {
        self.depth.store(depth, Ordering::Relaxed);
        self.holder.store(ThreadToken::current().as_u64(), Ordering::Release);
    }

    #[track_caller]
    fn unlock(&self) {
        if !self.is_self_locked() {
            contract_violation("mutex unlocked by a thread that does not hold it");
        }
        if self.depth.fetch_sub(1, Ordering::Relaxed) > 1 {
            return;
        }
        self.holder.store(ThreadToken::NONE.as_u64(), Ordering::Release);
        // SAFETY: the calling thread holds the raw lock (checked above).
        unsafe { self.raw.unlock() };
    }

    /// Fully release a possibly re-entered lock, returning its depth
    pub(crate) fn release_for_wait(&self) -> usize {
        if !self.is_self_locked() {
            contract_violation("condition wait without holding its mutex");
        }
        let depth = self.depth.swap(0, Ordering::Relaxed);
        self.holder.store(ThreadToken::NONE.as_u64(), Ordering::Release);
        // SAFETY: held by the calling thread (checked above).
        unsafe { self.raw.unlock() };
        depth
    }

    /// Re-acquire after a wait, restoring the saved depth
    pub(crate) fn reacquire_after_wait(&self, depth: usize) {
        self.acquire_raw();
        self.mark_acquired(depth);
    }
}

impl<T: ?Sized> Drop for Mutex<T> {
    fn drop(&mut self) {
        debug_assert!(
            self.holder().is_none() || std::thread::panicking(),
            "mutex destroyed while locked"
        );
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Mutex");
        d.field("holder", &self.holder());
        match self.try_lock() {
            Some(guard) => d.field("data", &&*guard),
            None => d.field("data", &format_args!("<locked>")),
        };
        d.finish()
    }
}

/// Scoped lock; unlocks when dropped
///
/// Not `Send`: a lock must be released by the thread that took it.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct MutexGuard<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,
    _not_send: PhantomData<*const ()>,
}

impl<'a, T: ?Sized> MutexGuard<'a, T> {
    fn new(mutex: &'a Mutex<T>) -> Self {
        Self {
            mutex,
            _not_send: PhantomData,
        }
    }

    /// The mutex this guard locks
    pub fn mutex(guard: &Self) -> &'a Mutex<T> {
        guard.mutex
    }
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves the lock is held by this thread; only
        // shared references are handed out.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

/// Mutex usable from a `static`, created on first use
///
/// The initialized flag answers whether anything has touched the lock yet,
/// which matters for code running during static setup or teardown.
pub struct GlobalMutex<T> {
    cell: OnceCell<Mutex<T>>,
    init: fn() -> T,
}

impl<T: Send> GlobalMutex<T> {
    pub const fn new(init: fn() -> T) -> Self {
        Self {
            cell: OnceCell::new(),
            init,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Initialize with an explicit policy.
    ///
    /// Returns false if the lock was already initialized.
    pub fn install(&self, policy: Arc<dyn LockPolicy>) -> bool {
        let mut installed = false;
        self.cell.get_or_init(|| {
            installed = true;
            Mutex::with_policy((self.init)(), policy)
        });
        installed
    }

    pub fn get(&self) -> &Mutex<T> {
        self.cell.get_or_init(|| Mutex::new((self.init)()))
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.get().lock()
    }
}
