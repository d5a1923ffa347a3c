//! Lock acquisition policy
//!
//! One thread per process (the UI/render thread) is privileged: when it
//! contends for a lock it probes with `try_lock` first and only then pays
//! for an instrumented blocking acquire. Whether the caller is that thread
//! is answered by a [`LockPolicy`] injected into each lock.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::atomic::AtomicFlag;
use crate::config::LockingConfig;
use crate::error::contract_violation;
use crate::thread::ThreadToken;

/// Capability check deciding which acquisition strategy a lock uses
pub trait LockPolicy: Send + Sync + fmt::Debug {
    /// True if the calling thread is the designated main thread
    fn is_main_thread(&self) -> bool;

    /// True while the process is in its normal running phase
    fn is_running(&self) -> bool {
        true
    }

    /// Main-thread blocks longer than this are logged as warnings
    fn slow_wait_threshold(&self) -> Duration {
        Duration::from_millis(10)
    }

    /// Whether `lock` should try the non-blocking probe first
    fn use_fast_path(&self) -> bool {
        self.is_main_thread() && self.is_running()
    }
}

/// Policy for locks that never see a privileged thread
#[derive(Debug, Default, Clone, Copy)]
pub struct Unprivileged;

impl LockPolicy for Unprivileged {
    #[inline]
    fn is_main_thread(&self) -> bool {
        false
    }
}

/// Designation of the process's main thread
pub struct MainThread {
    token: AtomicU64,
    running: AtomicFlag,
    fast_path: bool,
    slow_wait: Duration,
}

impl MainThread {
    /// Designate the calling thread
    pub fn designate_current() -> Arc<Self> {
        Self::designate_current_with(&LockingConfig::default())
    }

    pub fn designate_current_with(config: &LockingConfig) -> Arc<Self> {
        Arc::new(Self {
            token: AtomicU64::new(ThreadToken::current().as_u64()),
            running: AtomicFlag::new(true),
            fast_path: config.main_thread_fast_path,
            slow_wait: Duration::from_micros(config.slow_wait_warn_us),
        })
    }

    /// A designation that no thread satisfies until `reassign_to_current`
    pub fn unassigned() -> Arc<Self> {
        let config = LockingConfig::default();
        Arc::new(Self {
            token: AtomicU64::new(ThreadToken::NONE.as_u64()),
            running: AtomicFlag::new(true),
            fast_path: config.main_thread_fast_path,
            slow_wait: Duration::from_micros(config.slow_wait_warn_us),
        })
    }

    /// Move the designation to the calling thread
    pub fn reassign_to_current(&self) {
        self.token.store(ThreadToken::current().as_u64(), Ordering::SeqCst);
    }

    pub fn token(&self) -> ThreadToken {
        ThreadToken::from_u64(self.token.load(Ordering::SeqCst))
    }

    /// Enter or leave the running phase
    pub fn set_running(&self, running: bool) {
        self.running.set(running);
    }

    /// Fatal unless called from the main thread
    #[track_caller]
    pub fn assert_main_thread(&self) {
        if !self.is_main_thread() {
            contract_violation("main-thread-only operation called from another thread");
        }
    }
}

impl LockPolicy for MainThread {
    #[inline]
    fn is_main_thread(&self) -> bool {
        self.token().is_current()
    }

    #[inline]
    fn is_running(&self) -> bool {
        self.running.get()
    }

    fn slow_wait_threshold(&self) -> Duration {
        self.slow_wait
    }

    #[inline]
    fn use_fast_path(&self) -> bool {
        self.fast_path && self.is_main_thread() && self.is_running()
    }
}

impl fmt::Debug for MainThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainThread")
            .field("token", &self.token())
            .field("running", &self.running.get())
            .field("fast_path", &self.fast_path)
            .finish()
    }
}

/// Shared handle to an unprivileged policy
pub fn unprivileged() -> Arc<dyn LockPolicy> {
    Arc::new(Unprivileged)
}
