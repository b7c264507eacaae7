// Platform precondition error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Platform error code constants
///
/// Error code range: 2001-2003
pub struct PlatformErrorCodes {}

impl PlatformErrorCodes {
    /// Native library could not be loaded or was never registered
    pub const NATIVE_LIBRARY_UNAVAILABLE: i32 = 2001;

    /// Network monitor could not be activated
    pub const NETWORK_MONITOR_UNAVAILABLE: i32 = 2002;

    /// Platform context was missing or incomplete
    pub const CONTEXT_MISSING: i32 = 2003;
}

/// Log a platform error with structured context
pub fn log_platform_error(err: &PlatformError, context: &str) {
    error!(
        "Platform error in {}: code={}, component=PlatformAdapter, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised while establishing platform readiness
///
/// Any of these makes adapter construction fail; no engine is created.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformError {
    /// Native library load failed
    NativeLibraryUnavailable { reason: String },

    /// Network monitor activation failed
    NetworkMonitorUnavailable { reason: String },

    /// Platform context was not supplied or not initialized
    ContextMissing,
}

impl ErrorCode for PlatformError {
    fn code(&self) -> i32 {
        match self {
            PlatformError::NativeLibraryUnavailable { .. } => {
                PlatformErrorCodes::NATIVE_LIBRARY_UNAVAILABLE
            }
            PlatformError::NetworkMonitorUnavailable { .. } => {
                PlatformErrorCodes::NETWORK_MONITOR_UNAVAILABLE
            }
            PlatformError::ContextMissing => PlatformErrorCodes::CONTEXT_MISSING,
        }
    }

    fn message(&self) -> String {
        match self {
            PlatformError::NativeLibraryUnavailable { reason } => {
                format!("Native library unavailable: {}", reason)
            }
            PlatformError::NetworkMonitorUnavailable { reason } => {
                format!("Network monitor unavailable: {}", reason)
            }
            PlatformError::ContextMissing => "Platform context not initialized".to_string(),
        }
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PlatformError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for PlatformError {}
