//! Runtime configuration loaded from `.weft.toml`

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::buffer::DEFAULT_BLOCK_SIZE;
use crate::error::ConfigError;
use crate::logging::{parse_level, LogConfig, LogFormat};

/// File name searched for by [`Config::discover`]
pub const CONFIG_FILE_NAME: &str = ".weft.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub buffer: BufferConfig,

    #[serde(default)]
    pub threads: ThreadConfig,

    #[serde(default)]
    pub locking: LockingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormatSetting,

    /// Enables daily-rolling file output when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,

    #[serde(default = "default_false")]
    pub span_events: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatSetting {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Capacity of each `BufferArray` block in bytes
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadConfig {
    /// How long `ManagedThread::shutdown` waits for the worker
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockingConfig {
    /// Let the main thread probe with `try_lock` before blocking
    #[serde(default = "default_true")]
    pub main_thread_fast_path: bool,

    /// Main-thread blocks longer than this are logged as warnings
    #[serde(default = "default_slow_wait_warn_us")]
    pub slow_wait_warn_us: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormatSetting::default(),
            directory: None,
            span_events: false,
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
        }
    }
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            stack_size: None,
        }
    }
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            main_thread_fast_path: true,
            slow_wait_warn_us: default_slow_wait_warn_us(),
        }
    }
}

fn default_true() -> bool { true }
fn default_false() -> bool { false }
fn default_level() -> String { "info".to_string() }
fn default_block_size() -> usize { DEFAULT_BLOCK_SIZE }
fn default_shutdown_timeout_ms() -> u64 { 10_000 }
fn default_slow_wait_warn_us() -> u64 { 10_000 }

impl LoggingConfig {
    /// Translate into the logging module's configuration
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: parse_level(&self.level),
            format: match self.format {
                LogFormatSetting::Pretty => LogFormat::Pretty,
                LogFormatSetting::Compact => LogFormat::Compact,
                LogFormatSetting::Json => LogFormat::Json,
            },
            directory: self.directory.clone(),
            show_spans: self.span_events,
            ..LogConfig::default()
        }
    }
}

impl ThreadConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer.block_size == 0 {
            return Err(ConfigError::Invalid {
                field: "buffer.block_size",
                reason: "must be nonzero".to_string(),
            });
        }
        if self.threads.stack_size == Some(0) {
            return Err(ConfigError::Invalid {
                field: "threads.stack_size",
                reason: "must be nonzero when set".to_string(),
            });
        }
        Ok(())
    }

    /// Find and load `.weft.toml` from the current directory or its parents
    ///
    /// Falls back to defaults when nothing loadable is found.
    pub fn discover() -> Self {
        match std::env::current_dir() {
            Ok(dir) => Self::discover_from(&dir),
            Err(_) => Self::default(),
        }
    }

    /// Like [`discover`](Self::discover) but starting at `start`
    pub fn discover_from(start: &Path) -> Self {
        let mut current = Some(start.to_path_buf());

        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                match Self::load(&config_path) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!(
                        event = "config_invalid",
                        path = %config_path.display(),
                        error = %e,
                        "Ignoring unreadable config file"
                    ),
                }
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }

        Self::default()
    }

    /// Generate default configuration file content
    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate config"))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;

        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })
    }
}
