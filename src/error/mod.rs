// Error types for the netmux engine
//
// This module defines custom error types for engine, platform, and stream
// operations, providing structured error handling with error codes suitable
// for callers on the other side of an FFI boundary.

mod engine;
mod platform;
mod stream;

pub use engine::{log_engine_error, EngineError, EngineErrorCodes};
pub use platform::{log_platform_error, PlatformError, PlatformErrorCodes};
pub use stream::{StreamError, StreamErrorCodes, StreamErrorKind};

/// Status returned by integer-boundary operations on success.
pub const STATUS_SUCCESS: i32 = 0;

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the FFI boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

/// Collapse an operation result into the integer status used at the boundary.
///
/// `Ok` maps to [`STATUS_SUCCESS`]; errors map to their stable code.
pub fn status_code<T, E: ErrorCode>(result: &Result<T, E>) -> i32 {
    match result {
        Ok(_) => STATUS_SUCCESS,
        Err(err) => err.code(),
    }
}
