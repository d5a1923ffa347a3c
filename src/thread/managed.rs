//! Cooperative worker threads
//!
//! Design: the owner and the worker share an `Arc<ThreadInner>` holding the
//! status, a [`Condition`] over the run state (pause flag plus user data),
//! and the worker's run predicate. The worker sleeps on the condition while
//! [`should_sleep`](ManagedThread::should_sleep) holds; every change that
//! could end the sleep is made under the same lock and followed by a wake.
//!
//! State machine: `Stopped -> Running` (start), `Running -> Quitting`
//! (quit request), `Running | Quitting -> Stopped` (set by the worker thread
//! itself as it exits, including by panic).

use std::cell::Cell;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::utils::Backoff;
use once_cell::sync::Lazy;

use super::registry::ThreadLocalRegistry;
use crate::atomic::AtomicCounter;
use crate::config::ThreadConfig;
use crate::error::{contract_violation, ThreadError};
use crate::logging::{
    log_thread_panicked, log_thread_shutdown_timeout, log_thread_started, log_thread_state,
    log_thread_stopped,
};
use crate::sync::{unprivileged, Condition, LockPolicy, MutexGuard};

/// Managed threads constructed and not yet dropped
static THREAD_COUNT: Lazy<AtomicCounter<u32>> = Lazy::new(AtomicCounter::default);

/// Managed threads between start and exit
static RUNNING_COUNT: Lazy<AtomicCounter<u32>> = Lazy::new(AtomicCounter::default);

const SHUTDOWN_POLL: Duration = Duration::from_millis(5);

pub fn managed_count() -> u32 {
    THREAD_COUNT.get()
}

pub fn running_count() -> u32 {
    RUNNING_COUNT.get()
}

/// Give up the rest of the calling thread's time slice
#[inline]
pub fn yield_now() {
    thread::yield_now();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ThreadStatus {
    Stopped = 0,
    Running = 1,
    Quitting = 2,
}

impl ThreadStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Running,
            2 => Self::Quitting,
            _ => Self::Stopped,
        }
    }
}

/// The body of a managed thread
pub trait Worker: Send + 'static {
    /// Data shared between the owner and the worker, guarded by the thread's
    /// lock. Guards only give `&`, so use `Cell`/`RefCell` for mutation.
    type Shared: Send + 'static;

    /// Thread body. Should return soon after `ctx.is_quitting()` turns true.
    fn run(&mut self, ctx: &WorkerContext<'_, Self::Shared>);

    /// False while there is nothing to do; the worker then sleeps in
    /// [`WorkerContext::check_pause`]. Called with the lock held.
    fn run_condition(_shared: &Self::Shared) -> bool {
        true
    }
}

/// State protected by a managed thread's lock
pub struct RunState<S> {
    paused: Cell<bool>,
    shared: S,
}

impl<S> RunState<S> {
    pub fn is_paused(&self) -> bool {
        self.paused.get()
    }

    pub fn shared(&self) -> &S {
        &self.shared
    }
}

impl<S> Deref for RunState<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.shared
    }
}

impl<S: fmt::Debug> fmt::Debug for RunState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunState")
            .field("paused", &self.paused.get())
            .field("shared", &self.shared)
            .finish()
    }
}

struct ThreadInner<S> {
    name: String,
    status: AtomicU8,
    condition: Condition<RunState<S>>,
    run_condition: fn(&S) -> bool,
}

impl<S> ThreadInner<S> {
    fn status(&self) -> ThreadStatus {
        ThreadStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    /// Caller holds the lock
    fn transition(&self, to: ThreadStatus) -> ThreadStatus {
        let from = ThreadStatus::from_u8(self.status.swap(to as u8, Ordering::SeqCst));
        if from != to {
            log_thread_state(&self.name, from, to);
        }
        from
    }

    #[track_caller]
    fn check_guard(&self, guard: &MutexGuard<'_, RunState<S>>) {
        if !std::ptr::eq(MutexGuard::mutex(guard), self.condition.mutex()) {
            contract_violation("guard does not belong to this thread's lock");
        }
    }

    fn should_sleep(&self, state: &RunState<S>) -> bool {
        self.status() == ThreadStatus::Running
            && (state.is_paused() || !(self.run_condition)(&state.shared))
    }

    fn wake_locked(&self, state: &RunState<S>) {
        if !self.should_sleep(state) {
            self.condition.signal();
        }
    }
}

/// Marks the thread stopped when the worker returns or unwinds
struct ExitGuard<'a, S> {
    inner: &'a ThreadInner<S>,
}

impl<S> Drop for ExitGuard<'_, S> {
    fn drop(&mut self) {
        let panicked = thread::panicking();
        {
            let _state = self.inner.condition.lock();
            self.inner.transition(ThreadStatus::Stopped);
            self.inner.condition.broadcast();
        }
        RUNNING_COUNT.decrement();
        if panicked {
            log_thread_panicked(&self.inner.name);
        } else {
            log_thread_stopped(&self.inner.name);
        }
    }
}

/// The worker's view of its own thread
pub struct WorkerContext<'a, S> {
    inner: &'a ThreadInner<S>,
}

impl<S> WorkerContext<'_, S> {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[inline]
    pub fn is_quitting(&self) -> bool {
        self.inner.status() == ThreadStatus::Quitting
    }

    /// Sleep while paused or while the run predicate is false.
    ///
    /// Returns at once when a quit has been requested.
    pub fn check_pause(&self) {
        let mut state = self.inner.condition.lock();
        while self.inner.should_sleep(&state) {
            self.inner.condition.wait(&mut state);
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, RunState<S>> {
        self.inner.condition.lock()
    }

    /// Release the lock until woken
    pub fn wait(&self, guard: &mut MutexGuard<'_, RunState<S>>) {
        self.inner.condition.wait(guard);
    }

    pub fn should_sleep(&self, guard: &MutexGuard<'_, RunState<S>>) -> bool {
        self.inner.check_guard(guard);
        self.inner.should_sleep(guard)
    }
}

/// Owner handle of a cooperative worker thread
///
/// Dropping the handle shuts the thread down.
pub struct ManagedThread<W: Worker> {
    inner: Arc<ThreadInner<W::Shared>>,
    worker: Option<W>,
    handle: Option<JoinHandle<W>>,
    registry: Option<ThreadLocalRegistry>,
    config: ThreadConfig,
}

impl<W: Worker> ManagedThread<W> {
    pub fn new(name: impl Into<String>, worker: W, shared: W::Shared) -> Self {
        Self::build(name.into(), worker, shared, ThreadConfig::default(), None, unprivileged())
    }

    pub fn with_config(
        name: impl Into<String>,
        worker: W,
        shared: W::Shared,
        config: &ThreadConfig,
    ) -> Self {
        Self::build(name.into(), worker, shared, config.clone(), None, unprivileged())
    }

    /// Thread registered in `registry` while it runs; its lock gives the
    /// registry's main thread the fast path
    pub fn with_registry(
        name: impl Into<String>,
        worker: W,
        shared: W::Shared,
        config: &ThreadConfig,
        registry: &ThreadLocalRegistry,
    ) -> Self {
        let policy: Arc<dyn LockPolicy> = registry.main_thread().clone();
        Self::build(
            name.into(),
            worker,
            shared,
            config.clone(),
            Some(registry.clone()),
            policy,
        )
    }

    fn build(
        name: String,
        worker: W,
        shared: W::Shared,
        config: ThreadConfig,
        registry: Option<ThreadLocalRegistry>,
        policy: Arc<dyn LockPolicy>,
    ) -> Self {
        let state = RunState {
            paused: Cell::new(false),
            shared,
        };
        THREAD_COUNT.increment();
        Self {
            inner: Arc::new(ThreadInner {
                name,
                status: AtomicU8::new(ThreadStatus::Stopped as u8),
                condition: Condition::with_policy(state, policy),
                run_condition: W::run_condition,
            }),
            worker: Some(worker),
            handle: None,
            registry,
            config,
        }
    }

    /// Spawn the worker. Only valid while `Stopped`.
    pub fn start(&mut self) -> Result<(), ThreadError> {
        let status = self.status();
        if status != ThreadStatus::Stopped {
            return Err(ThreadError::AlreadyStarted {
                name: self.inner.name.clone(),
                status,
            });
        }
        self.reclaim_worker();
        let mut worker = self.worker.take().ok_or_else(|| ThreadError::WorkerLost {
            name: self.inner.name.clone(),
        })?;

        {
            let _state = self.inner.condition.lock();
            self.inner.transition(ThreadStatus::Running);
        }
        RUNNING_COUNT.increment();

        let mut builder = thread::Builder::new().name(self.inner.name.clone());
        if let Some(size) = self.config.stack_size {
            builder = builder.stack_size(size);
        }

        let inner = Arc::clone(&self.inner);
        let registry = self.registry.clone();
        let spawned = builder.spawn(move || {
            let _entry = registry.as_ref().map(|registry| registry.enter(&inner.name));
            let _exit = ExitGuard { inner: &inner };
            log_thread_started(&inner.name);
            worker.run(&WorkerContext { inner: &inner });
            worker
        });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(source) => {
                {
                    let _state = self.inner.condition.lock();
                    self.inner.transition(ThreadStatus::Stopped);
                }
                RUNNING_COUNT.decrement();
                Err(ThreadError::Spawn {
                    name: self.inner.name.clone(),
                    source,
                })
            }
        }
    }

    /// Ask the worker to finish. Does not block.
    pub fn set_quitting(&self) {
        let state = self.inner.condition.lock();
        if self.inner.status() == ThreadStatus::Running {
            self.inner.transition(ThreadStatus::Quitting);
        }
        self.inner.wake_locked(&state);
    }

    /// Owner thread only
    #[track_caller]
    pub fn pause(&self) {
        self.debug_check_owner();
        let state = self.inner.condition.lock();
        state.paused.set(true);
        self.inner.wake_locked(&state);
    }

    #[track_caller]
    pub fn unpause(&self) {
        self.debug_check_owner();
        let state = self.inner.condition.lock();
        state.paused.set(false);
        self.inner.wake_locked(&state);
    }

    /// True while stopped or paused
    pub fn is_paused(&self) -> bool {
        self.is_stopped() || self.inner.condition.lock().is_paused()
    }

    /// Let the worker re-evaluate its sleep predicate
    pub fn wake(&self) {
        let state = self.inner.condition.lock();
        self.inner.wake_locked(&state);
    }

    /// [`wake`](Self::wake) for callers already holding the lock
    #[track_caller]
    pub fn wake_locked(&self, guard: &MutexGuard<'_, RunState<W::Shared>>) {
        self.inner.check_guard(guard);
        self.inner.wake_locked(guard);
    }

    /// Running and either paused or without work
    #[track_caller]
    pub fn should_sleep(&self, guard: &MutexGuard<'_, RunState<W::Shared>>) -> bool {
        self.inner.check_guard(guard);
        self.inner.should_sleep(guard)
    }

    /// Lock the shared state, e.g. to queue work before `wake_locked`
    pub fn lock_data(&self) -> MutexGuard<'_, RunState<W::Shared>> {
        self.inner.condition.lock()
    }

    pub fn status(&self) -> ThreadStatus {
        self.inner.status()
    }

    pub fn is_stopped(&self) -> bool {
        self.status() == ThreadStatus::Stopped
    }

    pub fn is_quitting(&self) -> bool {
        self.status() == ThreadStatus::Quitting
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Worker state, available once the thread has stopped
    pub fn worker(&mut self) -> Option<&W> {
        if self.is_stopped() {
            self.reclaim_worker();
        }
        self.worker.as_ref()
    }

    /// Request quit and wait up to the configured timeout for the worker to
    /// stop. Returns false if it did not; the worker is then detached and
    /// later calls return at once.
    pub fn shutdown(&mut self) -> bool {
        // No handle: never started, already joined, or detached earlier.
        if self.handle.is_none() {
            return self.is_stopped();
        }
        self.set_quitting();

        let timeout = self.config.shutdown_timeout();
        let deadline = Instant::now() + timeout;
        let backoff = Backoff::new();
        while !self.is_stopped() {
            if Instant::now() >= deadline {
                log_thread_shutdown_timeout(&self.inner.name, timeout);
                self.handle = None;
                return false;
            }
            if backoff.is_completed() {
                thread::sleep(SHUTDOWN_POLL);
            } else {
                backoff.snooze();
            }
        }

        self.reclaim_worker();
        true
    }

    /// Registered threads are owned by the registry's main thread
    #[track_caller]
    fn debug_check_owner(&self) {
        if let Some(registry) = &self.registry {
            debug_assert!(
                registry.is_main_thread(),
                "managed thread '{}' paused or unpaused off its owner thread",
                self.inner.name
            );
        }
    }

    /// Join a finished worker thread and take back the worker
    fn reclaim_worker(&mut self) {
        if let Some(handle) = self.handle.take() {
            // A panicked worker was logged by its exit guard and is gone.
            if let Ok(worker) = handle.join() {
                self.worker = Some(worker);
            }
        }
    }
}

impl<W: Worker> Drop for ManagedThread<W> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown();
        }
        THREAD_COUNT.decrement();
    }
}

impl<W: Worker> fmt::Debug for ManagedThread<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedThread")
            .field("name", &self.inner.name)
            .field("status", &self.status())
            .field("joinable", &self.handle.is_some())
            .finish()
    }
}
