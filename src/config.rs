//! Configuration for the engine and its transport core
//!
//! The engine is started from a [`Configuration`] blob: either declarative
//! JSON text or the structured [`EngineConfig`] it deserializes into. The blob
//! is accepted once by `run` and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::EngineError;

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub stats: StatsConfig,
}

/// Engine runtime parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Upper bound on how long `run` waits for the transport core
    pub startup_timeout_ms: u64,
    /// Worker threads in the engine-owned runtime
    pub worker_threads: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            startup_timeout_ms: 10_000,
            worker_threads: 2,
        }
    }
}

/// Parameters handed to the transport core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Fixed delay before a response starts
    pub response_delay_ms: u64,
    /// Random extra delay added on top of `response_delay_ms`
    pub response_jitter_ms: u64,
    /// A stream with no outbound activity for this long fails with a timeout
    pub stream_idle_timeout_ms: u64,
    /// Streams beyond this many in flight are rejected
    pub max_concurrent_streams: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            response_delay_ms: 0,
            response_jitter_ms: 0,
            stream_idle_timeout_ms: 30_000,
            max_concurrent_streams: 256,
        }
    }
}

/// Stats pipeline parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Interval of the periodic counter flush
    pub flush_interval_ms: u64,
    /// Flush counters when the application moves to the background.
    ///
    /// Off by default: lifecycle-driven flushing stays disabled until the
    /// host's lifecycle callbacks can be registered without leaking the
    /// application object.
    pub lifecycle_flushing: bool,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 60_000,
            lifecycle_flushing: false,
        }
    }
}

impl EngineConfig {
    /// Reject values the engine cannot start with.
    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |reason: &str| {
            Err(EngineError::InvalidConfiguration {
                reason: reason.to_string(),
            })
        };

        if self.engine.startup_timeout_ms == 0 {
            return invalid("engine.startup_timeout_ms must be greater than 0");
        }
        if self.engine.worker_threads == 0 {
            return invalid("engine.worker_threads must be greater than 0");
        }
        if self.transport.stream_idle_timeout_ms == 0 {
            return invalid("transport.stream_idle_timeout_ms must be greater than 0");
        }
        if self.transport.max_concurrent_streams == 0 {
            return invalid("transport.max_concurrent_streams must be greater than 0");
        }
        if self.stats.flush_interval_ms == 0 {
            return invalid("stats.flush_interval_ms must be greater than 0");
        }
        Ok(())
    }

    /// Load configuration from JSON file
    ///
    /// # Returns
    /// The parsed configuration, or defaults if the file is missing or invalid.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration for Android, where assets are not reachable from Rust.
    #[cfg(target_os = "android")]
    pub fn load() -> Self {
        log::info!("[Config] Using default configuration on Android");
        Self::default()
    }

    /// Load configuration for non-Android platforms
    #[cfg(not(target_os = "android"))]
    pub fn load() -> Self {
        Self::load_from_file("assets/netmux.json")
    }
}

/// Immutable configuration blob accepted by `run`.
#[derive(Debug, Clone)]
pub enum Configuration {
    /// Declarative JSON text, parsed at startup
    Text(Arc<str>),
    /// Already-structured configuration
    Structured(EngineConfig),
}

impl Configuration {
    pub fn text(text: impl Into<Arc<str>>) -> Self {
        Configuration::Text(text.into())
    }

    /// Resolve the blob into a validated [`EngineConfig`].
    pub fn resolve(&self) -> Result<EngineConfig, EngineError> {
        let config = match self {
            Configuration::Text(text) => {
                if text.trim().is_empty() {
                    return Err(EngineError::InvalidConfiguration {
                        reason: "configuration text is empty".to_string(),
                    });
                }
                serde_json::from_str::<EngineConfig>(text)?
            }
            Configuration::Structured(config) => config.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

impl From<EngineConfig> for Configuration {
    fn from(config: EngineConfig) -> Self {
        Configuration::Structured(config)
    }
}

/// Logging verbosity requested by `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
    Off,
}

impl LogLevel {
    /// Map to the subscriber filter. `Critical` shares the `ERROR` level.
    pub fn to_level_filter(self) -> tracing::level_filters::LevelFilter {
        use tracing::level_filters::LevelFilter;
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error | LogLevel::Critical => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }

    /// Same mapping for records emitted through the `log` facade.
    pub fn to_log_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error | LogLevel::Critical => log::LevelFilter::Error,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
            LogLevel::Off => "off",
        }
    }
}

impl FromStr for LogLevel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "critical" => Ok(LogLevel::Critical),
            "off" => Ok(LogLevel::Off),
            other => Err(EngineError::InvalidConfiguration {
                reason: format!("unknown log level '{}'", other),
            }),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
