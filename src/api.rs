// Process-wide facade for foreign callers
// Every operation returns the integer status used across the FFI boundary

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::config::{Configuration, LogLevel};
use crate::engine::{Engine, OnEngineRunning};
use crate::error::{status_code, EngineError, PlatformError};
use crate::platform::{PlatformAdapter, PlatformContext};
use crate::stream::{StreamCallbacks, StreamHandle};
use crate::telemetry::LifecyclePhase;

// Re-export error code constants for FFI exposure
pub use crate::error::{EngineErrorCodes, PlatformErrorCodes, StreamErrorCodes, STATUS_SUCCESS};

/// The process-wide engine, created by [`init_engine`].
///
/// Constructed at most once; a failed construction leaves it empty so the
/// host may retry.
static ENGINE: OnceCell<PlatformAdapter> = OnceCell::new();

fn engine() -> Result<&'static PlatformAdapter, EngineError> {
    ENGINE
        .get()
        .ok_or(EngineError::PlatformPrecondition(PlatformError::ContextMissing))
}

/// The process-wide engine, if `init_engine` succeeded.
pub fn adapter() -> Option<&'static PlatformAdapter> {
    ENGINE.get()
}

/// Get the version of the engine library
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Create the process-wide engine.
///
/// Runs the platform preconditions on first call. Later calls return
/// success without touching the existing engine.
///
/// # Returns
/// * `0` - Engine exists
/// * `1009` - A platform precondition failed; no engine was created
pub fn init_engine(context: PlatformContext) -> i32 {
    let result = ENGINE.get_or_try_init(|| PlatformAdapter::new(context));
    status_code(&result)
}

/// Start the process-wide engine.
///
/// # Arguments
/// * `config_text` - Declarative JSON configuration
/// * `log_level` - One of trace, debug, info, warn, error, critical, off
/// * `on_running` - Fired once the engine accepts streams
///
/// # Returns
/// * `0` - Engine is running
/// * `1001` - Configuration or log level rejected
/// * `1002` - `run_engine` was already called
/// * `1004`/`1005` - Transport core failed or timed out
/// * `1007` - An earlier start failed
/// * `1009` - `init_engine` has not succeeded
pub fn run_engine(config_text: &str, log_level: &str, on_running: Option<OnEngineRunning>) -> i32 {
    let result = log_level.parse::<LogLevel>().and_then(|level| {
        engine()?.run(Configuration::text(config_text), level, on_running)
    });
    status_code(&result)
}

/// Open a stream on the process-wide engine.
///
/// # Errors
/// - `NotRunning` before `run_engine` succeeded, including before `init_engine`
pub fn start_stream(callbacks: Arc<dyn StreamCallbacks>) -> Result<StreamHandle, EngineError> {
    match ENGINE.get() {
        Some(engine) => engine.start_stream(callbacks),
        None => Err(EngineError::NotRunning),
    }
}

/// Record a counter increment.
///
/// # Returns
/// * `0` - Recorded
/// * `1003` - Engine not running (non-fatal)
/// * `1010` - Counter name rejected
pub fn record_counter(name: &str, count: u64) -> i32 {
    let result = match ENGINE.get() {
        Some(engine) => engine.record_counter(name, count),
        None => Err(EngineError::NotRunning),
    };
    status_code(&result)
}

/// Flush every counter now.
pub fn flush_stats() -> i32 {
    let result = match ENGINE.get() {
        Some(engine) => engine.core().flush_stats().map(|_| ()),
        None => Err(EngineError::NotRunning),
    };
    status_code(&result)
}

/// Report that the application moved to the background or foreground.
pub fn report_lifecycle(background: bool) -> i32 {
    let phase = if background {
        LifecyclePhase::Background
    } else {
        LifecyclePhase::Foreground
    };
    let result = engine().map(|engine| engine.on_lifecycle(phase));
    status_code(&result)
}
