//! Transport core abstraction driven by the engine.
//!
//! The real protocol stack lives behind [`TransportCore`]; the engine only
//! starts it once, hands it new streams, and shuts it down.

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::config::TransportConfig;
use crate::error::{EngineError, StreamError};
use crate::stream::{Outbound, StreamEventSender, StreamId};

/// Everything a transport needs to drive one stream.
pub struct TransportStream {
    pub id: StreamId,
    /// Frames written by the caller, in order.
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
    /// Writer for inbound events; enforces the single-terminal rule.
    pub events: StreamEventSender,
}

/// Trait implemented by transport cores.
///
/// `start` is called exactly once, from an engine-owned blocking thread, and
/// may take time; the engine bounds it with the configured startup timeout.
/// `open_stream` must not block: it hands the stream to tasks spawned on the
/// runtime given to `start`.
pub trait TransportCore: Send + Sync {
    fn start(&self, config: &TransportConfig, runtime: &Handle) -> Result<(), EngineError>;

    /// Take ownership of a new stream.
    ///
    /// An `Err` is reported to the stream asynchronously as its `on_error`.
    fn open_stream(&self, stream: TransportStream) -> Result<(), StreamError>;

    /// Number of streams currently being served.
    fn active_streams(&self) -> usize;

    fn shutdown(&self) {}
}

mod loopback;
pub use loopback::LoopbackTransport;
