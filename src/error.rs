//! Error types and contract-violation handling
//!
//! Recoverable conditions are returned as values. Broken invariants
//! (unlocking a lock you do not hold, dropping a referenced object) go
//! through [`contract_violation`], which logs and panics.

use std::fmt;
use std::io;

use crate::logging::log_contract_violation;
use crate::thread::ThreadStatus;

/// Errors from starting a managed thread
#[derive(Debug)]
pub enum ThreadError {
    /// `start` was called while the thread was not `Stopped`
    AlreadyStarted { name: String, status: ThreadStatus },
    /// The OS refused to spawn the worker
    Spawn { name: String, source: io::Error },
    /// A previous run panicked and took the worker state with it
    WorkerLost { name: String },
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyStarted { name, status } => {
                write!(f, "thread '{}' cannot start while {:?}", name, status)
            }
            Self::Spawn { name, source } => {
                write!(f, "failed to spawn thread '{}': {}", name, source)
            }
            Self::WorkerLost { name } => {
                write!(f, "worker of thread '{}' was lost to a panic", name)
            }
        }
    }
}

impl std::error::Error for ThreadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors from block construction and block-level appends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Data would not fit in the block
    OutOfRange { requested: usize, available: usize },
    /// The allocator could not provide memory
    AllocFailed { bytes: usize },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange { requested, available } => write!(
                f,
                "{} bytes requested but only {} available in block",
                requested, available
            ),
            Self::AllocFailed { bytes } => {
                write!(f, "failed to allocate {} bytes", bytes)
            }
        }
    }
}

impl std::error::Error for BufferError {}

/// Errors from loading or saving configuration
#[derive(Debug)]
pub enum ConfigError {
    Read { path: String, source: io::Error },
    Write { path: String, source: io::Error },
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
    /// Parsed, but a value is outside its allowed range
    Invalid { field: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, source } => write!(f, "failed to read config {}: {}", path, source),
            Self::Write { path, source } => write!(f, "failed to write config {}: {}", path, source),
            Self::Parse(e) => write!(f, "failed to parse config: {}", e),
            Self::Serialize(e) => write!(f, "failed to serialize config: {}", e),
            Self::Invalid { field, reason } => write!(f, "invalid config value {}: {}", field, reason),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read { source, .. } | Self::Write { source, .. } => Some(source),
            Self::Parse(e) => Some(e),
            Self::Serialize(e) => Some(e),
            Self::Invalid { .. } => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Parse(e)
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(e: toml::ser::Error) -> Self {
        Self::Serialize(e)
    }
}

/// Report a broken invariant and stop the calling thread.
///
/// These are bookkeeping failures that cannot be continued past, so the
/// event is logged at error severity before panicking.
#[cold]
#[inline(never)]
#[track_caller]
pub fn contract_violation(what: &str) -> ! {
    let location = std::panic::Location::caller();
    log_contract_violation(what, location);
    panic!("contract violation: {} (at {})", what, location);
}
