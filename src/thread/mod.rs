//! Thread identity, per-thread data and managed worker threads

mod id;
mod managed;
mod registry;


pub use id::ThreadToken;
pub use managed::{
    managed_count, running_count, yield_now, ManagedThread, RunState, ThreadStatus, Worker,
    WorkerContext,
};
pub use registry::{ThreadLocalData, ThreadLocalGuard, ThreadLocalRegistry};
