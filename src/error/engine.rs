// Engine error types and constants

use crate::error::{ErrorCode, PlatformError};
use log::error;
use std::fmt;

/// Engine error code constants exposed to foreign callers
///
/// These constants are the stable status values returned by `run` and
/// `record_counter` at the integer boundary. They never change meaning
/// between releases.
///
/// Error code range: 1001-1010
pub struct EngineErrorCodes {}

impl EngineErrorCodes {
    /// Configuration blob was rejected at startup
    pub const INVALID_CONFIGURATION: i32 = 1001;

    /// `run` was already called on this engine
    pub const ALREADY_RUNNING: i32 = 1002;

    /// Engine has not reached the running state
    pub const NOT_RUNNING: i32 = 1003;

    /// Transport core failed to initialize
    pub const TRANSPORT_INIT: i32 = 1004;

    /// Transport core did not come up within the startup timeout
    pub const STARTUP_TIMEOUT: i32 = 1005;

    // 1006 is reserved and never returned.

    /// Startup failed earlier; the engine must be reconstructed
    pub const TERMINATED: i32 = 1007;

    /// Write attempted on a stream that already reached a terminal state
    pub const STREAM_CLOSED: i32 = 1008;

    /// Platform readiness could not be established
    pub const PLATFORM_PRECONDITION: i32 = 1009;

    /// Counter name is not a dotted sequence of valid elements
    pub const INVALID_COUNTER_NAME: i32 = 1010;
}

/// Log an engine error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_engine_error(err: &EngineError, context: &str) {
    error!(
        "Engine error in {}: code={}, component=EngineCore, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Engine-level errors
///
/// These are always reported synchronously to the caller, either as a
/// `Result` or as the integer status derived from it.
///
/// Error code range: 1001-1010
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Configuration blob could not be parsed or failed validation
    InvalidConfiguration { reason: String },

    /// Engine already started (or is starting)
    AlreadyRunning,

    /// Engine has not reached the running state
    NotRunning,

    /// Transport core rejected startup
    TransportInit { reason: String },

    /// Transport core did not report ready in time
    StartupTimeout { timeout_ms: u64 },

    /// Previous startup failed; the instance is unusable
    Terminated,

    /// Stream already completed, errored, or was cancelled
    StreamClosed { stream_id: u64 },

    /// Platform readiness failed before the engine could be constructed
    PlatformPrecondition(PlatformError),

    /// Counter name failed validation
    InvalidCounterName { name: String },
}

impl ErrorCode for EngineError {
    fn code(&self) -> i32 {
        match self {
            EngineError::InvalidConfiguration { .. } => EngineErrorCodes::INVALID_CONFIGURATION,
            EngineError::AlreadyRunning => EngineErrorCodes::ALREADY_RUNNING,
            EngineError::NotRunning => EngineErrorCodes::NOT_RUNNING,
            EngineError::TransportInit { .. } => EngineErrorCodes::TRANSPORT_INIT,
            EngineError::StartupTimeout { .. } => EngineErrorCodes::STARTUP_TIMEOUT,
            EngineError::Terminated => EngineErrorCodes::TERMINATED,
            EngineError::StreamClosed { .. } => EngineErrorCodes::STREAM_CLOSED,
            EngineError::PlatformPrecondition(_) => EngineErrorCodes::PLATFORM_PRECONDITION,
            EngineError::InvalidCounterName { .. } => EngineErrorCodes::INVALID_COUNTER_NAME,
        }
    }

    fn message(&self) -> String {
        match self {
            EngineError::InvalidConfiguration { reason } => {
                format!("Invalid configuration: {}", reason)
            }
            EngineError::AlreadyRunning => {
                "Engine already started. run() may only be called once.".to_string()
            }
            EngineError::NotRunning => {
                "Engine not running. Wait for the on-ready notification.".to_string()
            }
            EngineError::TransportInit { reason } => {
                format!("Transport core failed to start: {}", reason)
            }
            EngineError::StartupTimeout { timeout_ms } => {
                format!("Transport core not ready after {}ms", timeout_ms)
            }
            EngineError::Terminated => {
                "Engine startup failed earlier. Construct a new engine.".to_string()
            }
            EngineError::StreamClosed { stream_id } => {
                format!("Stream {} already closed", stream_id)
            }
            EngineError::PlatformPrecondition(err) => {
                format!("Platform precondition failed: {}", err.message())
            }
            EngineError::InvalidCounterName { name } => {
                format!("Invalid counter name '{}'", name)
            }
        }
    }
}

impl EngineError {
    /// Whether this error ends the engine instance.
    ///
    /// Telemetry and stream-scoped errors are never fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidConfiguration { .. }
                | EngineError::TransportInit { .. }
                | EngineError::StartupTimeout { .. }
                | EngineError::Terminated
                | EngineError::PlatformPrecondition(_)
        )
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EngineError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for EngineError {}

impl From<PlatformError> for EngineError {
    fn from(err: PlatformError) -> Self {
        EngineError::PlatformPrecondition(err)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::InvalidConfiguration {
            reason: err.to_string(),
        }
    }
}
