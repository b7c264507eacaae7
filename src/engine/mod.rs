//! Engine module housing the stream-multiplexing core.
//!
//! `backend` holds the transport core abstraction, `registry` tracks live
//! streams, and `core` is the `EngineCore` that owns both. The [`Engine`]
//! trait is the capability surface shared by `EngineCore` and the platform
//! adapter that wraps it.

use std::sync::Arc;

use crate::config::{Configuration, LogLevel};
use crate::error::EngineError;
use crate::stream::{StreamCallbacks, StreamHandle};

pub mod backend;
pub mod core;
pub mod registry;

pub use backend::{LoopbackTransport, TransportCore, TransportStream};
pub use core::{EngineCore, EngineState};
pub use registry::StreamRegistry;

/// Notification fired once the engine accepts streams.
pub type OnEngineRunning = Box<dyn FnOnce() + Send + 'static>;

/// Operations every engine variant exposes.
pub trait Engine: Send + Sync {
    /// Start the transport core with `configuration`.
    ///
    /// Succeeds at most once per instance. `on_running` is invoked on an
    /// engine thread after the running state is visible to every thread.
    fn run(
        &self,
        configuration: Configuration,
        log_level: LogLevel,
        on_running: Option<OnEngineRunning>,
    ) -> Result<(), EngineError>;

    /// Open a stream whose events are delivered to `callbacks`.
    ///
    /// Fails with [`EngineError::NotRunning`] before `run` succeeds. Never
    /// waits on network I/O.
    fn start_stream(&self, callbacks: Arc<dyn StreamCallbacks>)
        -> Result<StreamHandle, EngineError>;

    /// Add `count` to the counter `name`. Best-effort.
    fn record_counter(&self, name: &str, count: u64) -> Result<(), EngineError>;
}
