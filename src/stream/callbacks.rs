use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::runtime::Handle;

use crate::error::StreamError;

use super::{Headers, StreamEvent, StreamEvents, StreamId};

/// Caller-supplied handlers for one stream.
///
/// Invoked on an engine-managed thread, strictly in wire order, and only for
/// the stream they were registered against. Exactly one of `on_complete`,
/// `on_error`, or `on_cancel` is called, after which nothing else is.
pub trait StreamCallbacks: Send + Sync + 'static {
    fn on_headers(&self, _stream_id: StreamId, _headers: Headers, _end_stream: bool) {}

    fn on_data(&self, _stream_id: StreamId, _data: Bytes, _end_stream: bool) {}

    fn on_trailers(&self, _stream_id: StreamId, _trailers: Headers) {}

    fn on_error(&self, _stream_id: StreamId, _error: StreamError) {}

    fn on_cancel(&self, _stream_id: StreamId) {}

    fn on_complete(&self, _stream_id: StreamId) {}
}

/// Callbacks for one stream, serialized behind a finished flag.
///
/// The lock is held for the duration of each callback, so a terminal event
/// delivered from outside the drain task can never interleave with one the
/// drain task is delivering.
struct Sink {
    id: StreamId,
    callbacks: Arc<dyn StreamCallbacks>,
    finished: Mutex<bool>,
}

impl Sink {
    fn new(id: StreamId, callbacks: Arc<dyn StreamCallbacks>) -> Self {
        Self {
            id,
            callbacks,
            finished: Mutex::new(false),
        }
    }

    // A panicking callback leaves the flag as it was; delivery may continue.
    fn lock_finished(&self) -> MutexGuard<'_, bool> {
        self.finished
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Invoke the callback for `event`. Returns false once the sink finished.
    fn dispatch(&self, event: StreamEvent) -> bool {
        let mut finished = self.lock_finished();
        if *finished {
            return false;
        }
        *finished = event.is_terminal();

        let id = self.id;
        let callbacks = &self.callbacks;
        match event {
            StreamEvent::Headers {
                headers,
                end_stream,
            } => callbacks.on_headers(id, headers, end_stream),
            StreamEvent::Data { data, end_stream } => callbacks.on_data(id, data, end_stream),
            StreamEvent::Trailers(trailers) => callbacks.on_trailers(id, trailers),
            StreamEvent::Error(error) => callbacks.on_error(id, error),
            StreamEvent::Cancel => callbacks.on_cancel(id),
            StreamEvent::Complete => callbacks.on_complete(id),
        }
        true
    }
}

/// Callback sinks whose drain task has not finished yet.
#[derive(Default)]
pub(crate) struct SinkRegistry {
    sinks: DashMap<StreamId, Arc<Sink>>,
}

impl SinkRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Spawn a task on `runtime` draining `events` into `callbacks`.
    pub(crate) fn spawn_delivery(
        self: &Arc<Self>,
        runtime: &Handle,
        mut events: StreamEvents,
        callbacks: Arc<dyn StreamCallbacks>,
    ) {
        let id = events.stream_id();
        let sink = Arc::new(Sink::new(id, callbacks));
        self.sinks.insert(id, Arc::clone(&sink));

        let registry = Arc::clone(self);
        runtime.spawn(async move {
            while let Some(event) = events.recv().await {
                if !sink.dispatch(event) {
                    break;
                }
            }
            registry.sinks.remove(&id);
        });
    }

    /// Deliver `error` to every sink that has not seen a terminal event.
    ///
    /// Used once the drain tasks can no longer run. Returns how many sinks
    /// received the error.
    pub(crate) fn fail_undelivered(&self, error: &StreamError) -> usize {
        let pending: Vec<Arc<Sink>> = self
            .sinks
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.sinks.clear();

        pending
            .iter()
            .filter(|sink| sink.dispatch(StreamEvent::Error(error.clone())))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamErrorKind;

    #[derive(Default)]
    struct Calls(Mutex<Vec<String>>);

    impl StreamCallbacks for Calls {
        fn on_data(&self, _stream_id: StreamId, _data: Bytes, _end_stream: bool) {
            self.0.lock().unwrap().push("data".to_string());
        }

        fn on_error(&self, _stream_id: StreamId, error: StreamError) {
            self.0.lock().unwrap().push(format!("error:{:?}", error.kind));
        }

        fn on_complete(&self, _stream_id: StreamId) {
            self.0.lock().unwrap().push("complete".to_string());
        }
    }

    #[test]
    fn sink_stops_after_terminal_event() {
        let calls = Arc::new(Calls::default());
        let sink = Sink::new(1, Arc::clone(&calls) as Arc<dyn StreamCallbacks>);

        assert!(sink.dispatch(StreamEvent::Data {
            data: Bytes::from_static(b"x"),
            end_stream: false,
        }));
        assert!(sink.dispatch(StreamEvent::Complete));
        assert!(!sink.dispatch(StreamEvent::Error(StreamError::new(
            StreamErrorKind::Reset,
            "late",
        ))));

        assert_eq!(*calls.0.lock().unwrap(), vec!["data", "complete"]);
    }

    #[test]
    fn fail_undelivered_reaches_only_unfinished_sinks() {
        let registry = SinkRegistry::new();
        let open = Arc::new(Calls::default());
        let done = Arc::new(Calls::default());

        let done_sink = Arc::new(Sink::new(2, Arc::clone(&done) as Arc<dyn StreamCallbacks>));
        done_sink.dispatch(StreamEvent::Complete);
        registry.sinks.insert(2, done_sink);
        registry.sinks.insert(
            1,
            Arc::new(Sink::new(1, Arc::clone(&open) as Arc<dyn StreamCallbacks>)),
        );

        let error = StreamError::new(StreamErrorKind::EngineShutdown, "engine dropped");
        assert_eq!(registry.fail_undelivered(&error), 1);
        assert!(registry.sinks.is_empty());

        assert_eq!(*open.0.lock().unwrap(), vec!["error:EngineShutdown"]);
        assert_eq!(*done.0.lock().unwrap(), vec!["complete"]);
    }
}
