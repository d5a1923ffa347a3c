//! Locking primitives
//!
//! Design: one recursive [`Mutex`] type carries the holder record and the
//! main-thread strategy; [`Condition`] and [`PriorityRwLock`] are built on
//! top of it so every blocking point shares the same instrumentation.

mod condition;
mod mutex;
mod policy;
mod rwlock;

#[cfg(test)]
mod tests;

pub use condition::Condition;
pub use mutex::{GlobalMutex, LockStats, Mutex, MutexGuard};
pub use policy::{unprivileged, LockPolicy, MainThread, Unprivileged};
pub use rwlock::{PriorityRwLock, ReadGuard, WriteGuard};
