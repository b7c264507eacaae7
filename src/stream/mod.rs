//! Stream handles and the per-stream event channel.
//!
//! Every stream owns one unbounded channel. The transport core posts inbound
//! events onto it in wire order; the caller (or an engine-side drain task
//! feeding [`StreamCallbacks`]) drains it. A shared terminal flag guarantees
//! that exactly one of complete / error / cancel is ever posted, and
//! [`StreamEvents`] drops anything that slips in behind a terminal event.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::engine::registry::StreamRegistry;
use crate::error::{EngineError, StreamError};
use crate::telemetry::StreamOutcome;

mod callbacks;
mod headers;

pub use callbacks::StreamCallbacks;
pub(crate) use callbacks::SinkRegistry;
pub use headers::Headers;

/// Engine-unique stream identifier.
pub type StreamId = u64;

/// Inbound event for a single stream, in wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Headers { headers: Headers, end_stream: bool },
    Data { data: Bytes, end_stream: bool },
    Trailers(Headers),
    Error(StreamError),
    Cancel,
    Complete,
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Error(_) | StreamEvent::Cancel | StreamEvent::Complete
        )
    }

    fn outcome(&self) -> Option<StreamOutcome> {
        match self {
            StreamEvent::Complete => Some(StreamOutcome::Completed),
            StreamEvent::Error(_) => Some(StreamOutcome::Errored),
            StreamEvent::Cancel => Some(StreamOutcome::Cancelled),
            _ => None,
        }
    }
}

/// Outbound frame written by the caller through a [`StreamHandle`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outbound {
    Headers { headers: Headers, end_stream: bool },
    Data { data: Vec<u8>, end_stream: bool },
    Trailers(Headers),
    Cancel,
}

/// State shared between a handle, its event sender, and the registry.
pub(crate) struct StreamShared {
    id: StreamId,
    terminal: AtomicBool,
    events: mpsc::UnboundedSender<StreamEvent>,
    registry: Weak<StreamRegistry>,
}

impl StreamShared {
    pub(crate) fn new(
        id: StreamId,
        events: mpsc::UnboundedSender<StreamEvent>,
        registry: Weak<StreamRegistry>,
    ) -> Self {
        Self {
            id,
            terminal: AtomicBool::new(false),
            events,
            registry,
        }
    }

    pub(crate) fn id(&self) -> StreamId {
        self.id
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.terminal.load(Ordering::SeqCst)
    }

    /// Post an event. Returns false if the stream already ended.
    ///
    /// A terminal event is posted only by whoever flips the terminal flag
    /// first; the loser is dropped.
    pub(crate) fn post(&self, event: StreamEvent) -> bool {
        match event.outcome() {
            Some(outcome) => {
                if self.terminal.swap(true, Ordering::SeqCst) {
                    return false;
                }
                let _ = self.events.send(event);
                if let Some(registry) = self.registry.upgrade() {
                    registry.release(self.id, outcome);
                }
                true
            }
            None => {
                if self.is_terminal() {
                    return false;
                }
                self.events.send(event).is_ok()
            }
        }
    }
}

/// Transport-side writer for a stream's inbound events.
#[derive(Clone)]
pub struct StreamEventSender {
    shared: Arc<StreamShared>,
}

impl StreamEventSender {
    pub(crate) fn new(shared: Arc<StreamShared>) -> Self {
        Self { shared }
    }

    pub fn stream_id(&self) -> StreamId {
        self.shared.id()
    }

    /// Whether a terminal event has already been posted.
    pub fn is_closed(&self) -> bool {
        self.shared.is_terminal()
    }

    pub fn headers(&self, headers: Headers, end_stream: bool) -> bool {
        self.shared.post(StreamEvent::Headers {
            headers,
            end_stream,
        })
    }

    pub fn data(&self, data: impl Into<Bytes>, end_stream: bool) -> bool {
        self.shared.post(StreamEvent::Data {
            data: data.into(),
            end_stream,
        })
    }

    pub fn trailers(&self, trailers: Headers) -> bool {
        self.shared.post(StreamEvent::Trailers(trailers))
    }

    pub fn error(&self, error: StreamError) -> bool {
        self.shared.post(StreamEvent::Error(error))
    }

    pub fn complete(&self) -> bool {
        self.shared.post(StreamEvent::Complete)
    }
}

/// Caller-side handle for one request/response exchange.
///
/// Dropping the handle does not cancel the stream; inbound events keep
/// flowing until the exchange reaches a terminal state.
pub struct StreamHandle {
    shared: Arc<StreamShared>,
    outbound: mpsc::UnboundedSender<Outbound>,
    request_ended: AtomicBool,
}

impl StreamHandle {
    pub(crate) fn new(shared: Arc<StreamShared>, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            shared,
            outbound,
            request_ended: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> StreamId {
        self.shared.id()
    }

    /// Whether complete, error, or cancel has already been delivered.
    pub fn is_closed(&self) -> bool {
        self.shared.is_terminal()
    }

    pub fn send_headers(&self, headers: Headers, end_stream: bool) -> Result<(), EngineError> {
        self.write(Outbound::Headers {
            headers,
            end_stream,
        }, end_stream)
    }

    pub fn send_data(&self, data: impl Into<Vec<u8>>, end_stream: bool) -> Result<(), EngineError> {
        self.write(
            Outbound::Data {
                data: data.into(),
                end_stream,
            },
            end_stream,
        )
    }

    /// Send request trailers. Trailers always end the request side.
    pub fn send_trailers(&self, trailers: Headers) -> Result<(), EngineError> {
        self.write(Outbound::Trailers(trailers), true)
    }

    /// Cancel the stream.
    ///
    /// Returns true if the cancel won the race for the terminal event; false
    /// if the stream had already completed, errored, or been cancelled.
    pub fn cancel(&self) -> bool {
        if !self.shared.post(StreamEvent::Cancel) {
            return false;
        }
        let _ = self.outbound.send(Outbound::Cancel);
        log::debug!("[Stream {}] cancelled by caller", self.id());
        true
    }

    fn write(&self, frame: Outbound, ends_request: bool) -> Result<(), EngineError> {
        let closed = EngineError::StreamClosed {
            stream_id: self.id(),
        };
        if self.shared.is_terminal() || self.request_ended.load(Ordering::SeqCst) {
            return Err(closed);
        }
        if ends_request && self.request_ended.swap(true, Ordering::SeqCst) {
            return Err(closed);
        }
        self.outbound.send(frame).map_err(|_| closed)
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("id", &self.id())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Ordered inbound events for one stream.
///
/// Yields at most one terminal event and ends right after it.
pub struct StreamEvents {
    id: StreamId,
    rx: mpsc::UnboundedReceiver<StreamEvent>,
    finished: bool,
}

impl StreamEvents {
    pub(crate) fn new(id: StreamId, rx: mpsc::UnboundedReceiver<StreamEvent>) -> Self {
        Self {
            id,
            rx,
            finished: false,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }
        let event = self.rx.recv().await;
        self.observe(event)
    }

    /// Blocking receive for callers outside an async context.
    ///
    /// Panics if called from within an async runtime, like
    /// [`mpsc::UnboundedReceiver::blocking_recv`].
    pub fn blocking_recv(&mut self) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }
        let event = self.rx.blocking_recv();
        self.observe(event)
    }

    fn observe(&mut self, event: Option<StreamEvent>) -> Option<StreamEvent> {
        match event {
            Some(event) => {
                if event.is_terminal() {
                    self.finished = true;
                    self.rx.close();
                }
                Some(event)
            }
            None => {
                self.finished = true;
                None
            }
        }
    }
}

impl Stream for StreamEvents {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(event) => Poll::Ready(self.observe(event)),
            Poll::Pending => Poll::Pending,
        }
    }
}
