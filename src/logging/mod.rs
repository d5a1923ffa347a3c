//! Logging infrastructure - structured tracing for locks, threads and buffers
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log levels per module
//! - Zero-cost when disabled
//! - Stdout, or daily-rolling files through a non-blocking writer
//!
//! Every event carries an `event = "..."` field so log pipelines can key on
//! it without parsing messages.

use std::io;
use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use once_cell::sync::OnceCell;
use tracing::Level;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::thread::{ThreadStatus, ThreadToken};

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

static TRACK_PERFORMANCE: AtomicBool = AtomicBool::new(false);

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, multi-line
    Pretty,
    /// One line per event
    Compact,
    /// Newline-delimited JSON
    Json,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    pub format: LogFormat,
    /// Directory for daily-rolling log files; stdout when unset
    pub directory: Option<String>,
    /// File name prefix inside `directory`
    pub file_prefix: String,
    /// Show span events (new/close)
    pub show_spans: bool,
    /// Enable `perf::track` output
    pub track_performance: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            directory: None,
            file_prefix: "weft.log".to_string(),
            show_spans: false,
            track_performance: cfg!(debug_assertions),
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // WEFT_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("WEFT_LOG_LEVEL") {
            config.level = parse_level(&level_str);
        }

        // WEFT_LOG_FILE: directory for rolling log files
        if let Ok(path) = std::env::var("WEFT_LOG_FILE") {
            config.directory = Some(path);
        }

        if std::env::var("WEFT_LOG_JSON").is_ok() {
            config.format = LogFormat::Json;
        }

        config.show_spans = std::env::var("WEFT_LOG_SPANS").is_ok();

        if let Ok(val) = std::env::var("WEFT_LOG_PERF") {
            config.track_performance = val == "1" || val.eq_ignore_ascii_case("true");
        }

        config
    }

    /// Create high-performance config (errors only)
    pub fn performance() -> Self {
        Self {
            level: Level::ERROR,
            format: LogFormat::Compact,
            show_spans: false,
            track_performance: false,
            ..Self::default()
        }
    }

    /// Create debug config (verbose logging to `logs/`)
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            format: LogFormat::Pretty,
            directory: Some("logs".to_string()),
            show_spans: true,
            track_performance: true,
            ..Self::default()
        }
    }
}

/// Parse a level name, falling back to `INFO`
pub fn parse_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging with configuration from the environment
pub fn init() -> Option<WorkerGuard> {
    init_with_config(LogConfig::from_env())
}

/// Initialize logging with custom configuration
///
/// Only the first call installs a subscriber. When file output is used the
/// returned guard must be kept alive until shutdown so buffered lines are
/// flushed.
pub fn init_with_config(config: LogConfig) -> Option<WorkerGuard> {
    let mut guard = None;
    LOGGER_INITIALIZED.get_or_init(|| {
        TRACK_PERFORMANCE.store(config.track_performance, Ordering::Relaxed);

        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("weft={}", config.level.as_str().to_lowercase()))
        });

        let writer = match &config.directory {
            Some(directory) => {
                let file_appender = rolling::daily(directory, &config.file_prefix);
                let (non_blocking, worker) = tracing_appender::non_blocking(file_appender);
                guard = Some(worker);
                BoxMakeWriter::new(non_blocking)
            }
            None => BoxMakeWriter::new(io::stdout),
        };

        let span_events = if config.show_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let base = fmt::layer()
            .with_writer(writer)
            .with_span_events(span_events)
            .with_target(true)
            .with_thread_names(true)
            .with_line_number(cfg!(debug_assertions));

        let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
            LogFormat::Pretty => base.pretty().with_filter(env_filter).boxed(),
            LogFormat::Compact => base.compact().with_filter(env_filter).boxed(),
            LogFormat::Json => base.json().with_filter(env_filter).boxed(),
        };

        // Another subscriber may already be global (test harnesses, host
        // applications); keep it.
        let _ = tracing_subscriber::registry().with(layer).try_init();
    });
    guard
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Event helpers
// ============================================================================

/// Log a broken invariant just before the panic
#[cold]
pub fn log_contract_violation(what: &str, location: &Location<'_>) {
    tracing::error!(
        event = "contract_violation",
        violation = what,
        file = location.file(),
        line = location.line(),
        "Contract violation"
    );
}

/// Log a main-thread lock acquire that had to block
pub fn log_main_thread_contention(blocked: Duration, threshold: Duration) {
    let blocked_us = blocked.as_micros() as u64;
    if blocked >= threshold {
        tracing::warn!(
            event = "main_thread_contention",
            blocked_us,
            threshold_us = threshold.as_micros() as u64,
            "Main thread blocked on a contended lock"
        );
    } else {
        tracing::debug!(
            event = "main_thread_contention",
            blocked_us,
            "Main thread contended for a lock"
        );
    }
}

/// Log a main-thread condition wait
pub fn log_main_thread_wait(blocked: Duration, threshold: Duration) {
    let blocked_us = blocked.as_micros() as u64;
    if blocked >= threshold {
        tracing::warn!(
            event = "main_thread_wait",
            blocked_us,
            threshold_us = threshold.as_micros() as u64,
            "Main thread waited on a condition"
        );
    } else {
        tracing::trace!(event = "main_thread_wait", blocked_us, "Main thread condition wait");
    }
}

pub fn log_thread_started(name: &str) {
    tracing::info!(event = "thread_started", thread = name, "Managed thread started");
}

pub fn log_thread_stopped(name: &str) {
    tracing::info!(event = "thread_stopped", thread = name, "Managed thread stopped");
}

/// Log a state machine transition
pub fn log_thread_state(name: &str, from: ThreadStatus, to: ThreadStatus) {
    tracing::debug!(
        event = "thread_state",
        thread = name,
        from = ?from,
        to = ?to,
        "Managed thread changed state"
    );
}

/// Log a shutdown that gave up waiting for the worker
pub fn log_thread_shutdown_timeout(name: &str, timeout: Duration) {
    tracing::warn!(
        event = "thread_shutdown_timeout",
        thread = name,
        timeout_ms = timeout.as_millis() as u64,
        "Managed thread did not stop in time; detaching"
    );
}

/// Log a worker that ended by panicking
pub fn log_thread_panicked(name: &str) {
    tracing::error!(event = "thread_panicked", thread = name, "Managed thread panicked");
}

/// Log a block allocation failure during append
pub fn log_block_alloc_failure(bytes: usize, appended: usize, requested: usize) {
    tracing::warn!(
        event = "block_alloc_failure",
        block_bytes = bytes,
        appended,
        requested,
        "Buffer block allocation failed; append is short"
    );
}

pub fn log_thread_local_create(token: ThreadToken, name: &str) {
    tracing::debug!(
        event = "thread_local_create",
        token = token.as_u64(),
        thread = name,
        "Thread-local entry created"
    );
}

pub fn log_thread_local_teardown(token: ThreadToken) {
    tracing::trace!(
        event = "thread_local_teardown",
        token = token.as_u64(),
        "Thread-local entry destroyed"
    );
}

pub fn log_runtime_init(block_size: usize) {
    tracing::info!(event = "runtime_init", block_size, "Weft runtime initializing");
}

pub fn log_runtime_shutdown() {
    tracing::info!(event = "runtime_shutdown", "Weft runtime shutting down");
}

/// Performance tracking utilities
pub mod perf {
    use std::sync::atomic::Ordering;
    use std::time::Instant;
    use tracing::debug;

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &'static str) -> PerformanceGuard {
        PerformanceGuard {
            operation,
            start: Instant::now(),
            enabled: super::TRACK_PERFORMANCE.load(Ordering::Relaxed),
        }
    }

    pub struct PerformanceGuard {
        operation: &'static str,
        start: Instant,
        enabled: bool,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            if !self.enabled {
                return;
            }
            let elapsed = self.start.elapsed();
            debug!(
                event = "perf",
                operation = self.operation,
                duration_us = elapsed.as_micros() as u64,
                "operation completed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = LogConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(config.directory.is_none());

        let perf_config = LogConfig::performance();
        assert_eq!(perf_config.level, Level::ERROR);
        assert!(!perf_config.track_performance);

        let debug_config = LogConfig::debug();
        assert_eq!(debug_config.level, Level::TRACE);
        assert_eq!(debug_config.directory.as_deref(), Some("logs"));
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("WARN"), Level::WARN);
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("bogus"), Level::INFO);
    }

    #[test]
    fn test_init_idempotent() {
        let _ = init_with_config(LogConfig::performance());
        assert!(init_with_config(LogConfig::debug()).is_none());
        assert!(is_initialized());
    }

    #[test]
    fn test_event_helpers_do_not_panic() {
        log_main_thread_contention(Duration::from_millis(20), Duration::from_millis(10));
        log_main_thread_wait(Duration::from_micros(5), Duration::from_millis(10));
        log_thread_state("worker", ThreadStatus::Stopped, ThreadStatus::Running);
        log_block_alloc_failure(16, 4, 20);
        let _timer = perf::track("test");
    }
}
