//! Weft - thread-safety primitives and scatter/gather buffers
//!
//! This crate provides the concurrency core shared by streaming I/O layers
//! and worker subsystems: recursive locks with a main-thread fast path,
//! cooperative managed threads, intrusive reference counting and chunked
//! byte buffers.

pub mod atomic;
pub mod buffer;
pub mod config;
pub mod error;
pub mod logging;
pub mod refcount;
pub mod sync;
pub mod thread;

use std::sync::Arc;

use tracing_appender::non_blocking::WorkerGuard;

// Re-export core types
pub use atomic::{AtomicCounter, AtomicFlag};
pub use buffer::{BufferArray, BufferStream};
pub use config::Config;
pub use error::{BufferError, ConfigError, ThreadError};
pub use refcount::{RefCounted, RefPtr, Responder, ThreadSafeRefCount};
pub use sync::{Condition, GlobalMutex, LockPolicy, MainThread, Mutex, MutexGuard, PriorityRwLock};
pub use thread::{ManagedThread, ThreadLocalRegistry, ThreadStatus, Worker, WorkerContext};

/// Process-level wiring of logging, the main-thread designation and the
/// thread registry
pub struct Runtime {
    config: Config,
    main: Arc<MainThread>,
    registry: ThreadLocalRegistry,
    _log_guard: Option<WorkerGuard>,
}

/// Runtime initialization
///
/// Installs logging (first call only) and designates the calling thread as
/// the main thread.
pub fn init(config: &Config) -> Runtime {
    let log_guard = logging::init_with_config(config.logging.to_log_config());
    logging::log_runtime_init(config.buffer.block_size);

    let main = MainThread::designate_current_with(&config.locking);
    let registry = ThreadLocalRegistry::with_main_thread(Arc::clone(&main));

    Runtime {
        config: config.clone(),
        main,
        registry,
        _log_guard: log_guard,
    }
}

impl Runtime {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ThreadLocalRegistry {
        &self.registry
    }

    pub fn main_thread(&self) -> &Arc<MainThread> {
        &self.main
    }

    /// Policy giving this runtime's main thread the fast path
    pub fn lock_policy(&self) -> Arc<dyn LockPolicy> {
        self.main.clone()
    }

    pub fn new_mutex<T>(&self, value: T) -> Mutex<T> {
        Mutex::with_policy(value, self.lock_policy())
    }

    pub fn new_condition<T>(&self, value: T) -> Condition<T> {
        Condition::with_policy(value, self.lock_policy())
    }

    /// Empty shareable buffer using the configured block size
    pub fn new_buffer(&self) -> RefPtr<BufferArray> {
        RefPtr::new(BufferArray::from_config(&self.config.buffer))
    }

    /// Create a registered managed thread and start it
    pub fn spawn_thread<W: Worker>(
        &self,
        name: impl Into<String>,
        worker: W,
        shared: W::Shared,
    ) -> Result<ManagedThread<W>, ThreadError> {
        let mut thread =
            ManagedThread::with_registry(name, worker, shared, &self.config.threads, &self.registry);
        thread.start()?;
        Ok(thread)
    }

    /// Leave the running phase; main-thread locks stop taking the fast path
    pub fn shutdown(self) {
        let _timer = logging::perf::track("runtime.shutdown");
        self.main.set_running(false);
        logging::log_runtime_shutdown();
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("main", &self.main)
            .field("registry", &self.registry)
            .finish()
    }
}
