// Stream transport error types and constants

use crate::error::ErrorCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stream error code constants
///
/// Error code range: 3001-3005
pub struct StreamErrorCodes {}

impl StreamErrorCodes {
    pub const CONNECTION_FAILURE: i32 = 3001;
    pub const TIMEOUT: i32 = 3002;
    pub const RESET: i32 = 3003;
    pub const BUFFER_LIMIT_EXCEEDED: i32 = 3004;
    pub const ENGINE_SHUTDOWN: i32 = 3005;
}

/// Category of a mid-stream transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamErrorKind {
    ConnectionFailure,
    Timeout,
    Reset,
    BufferLimitExceeded,
    EngineShutdown,
}

/// Transport failure scoped to a single stream.
///
/// Delivered asynchronously through the stream's `on_error` callback; it
/// never affects the engine or sibling streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamError {
    pub kind: StreamErrorKind,
    pub message: String,
    /// Number of upstream attempts made before giving up, when known
    pub attempt_count: Option<u32>,
}

impl StreamError {
    pub fn new(kind: StreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            attempt_count: None,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempt_count = Some(attempts);
        self
    }
}

impl ErrorCode for StreamError {
    fn code(&self) -> i32 {
        match self.kind {
            StreamErrorKind::ConnectionFailure => StreamErrorCodes::CONNECTION_FAILURE,
            StreamErrorKind::Timeout => StreamErrorCodes::TIMEOUT,
            StreamErrorKind::Reset => StreamErrorCodes::RESET,
            StreamErrorKind::BufferLimitExceeded => StreamErrorCodes::BUFFER_LIMIT_EXCEEDED,
            StreamErrorKind::EngineShutdown => StreamErrorCodes::ENGINE_SHUTDOWN,
        }
    }

    fn message(&self) -> String {
        self.message.clone()
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamError::{:?} (code {}): {}", self.kind, self.code(), self.message)
    }
}

impl std::error::Error for StreamError {}
