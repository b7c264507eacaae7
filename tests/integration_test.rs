//! Integration tests for the engine facade
//!
//! These tests drive the public API end to end:
//! - Platform adapter construction and precondition failures
//! - Engine run lifecycle and second-run behavior
//! - Stream delivery through callbacks and channels
//! - Counter recording before and after startup

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use netmux::error::{EngineErrorCodes, StreamErrorKind};
use netmux::platform::{NativeLibraryLoader, PlatformAdapterBuilder, ReadinessGate};
use netmux::{
    Configuration, Engine, EngineError, ErrorCode, Headers, LogLevel, PlatformAdapter,
    PlatformContext, PlatformError, StreamCallbacks, StreamError, StreamEvent, StreamId,
};

fn isolated_builder() -> PlatformAdapterBuilder {
    let library: &'static ReadinessGate = Box::leak(Box::new(ReadinessGate::new("library")));
    let monitor: &'static ReadinessGate = Box::leak(Box::new(ReadinessGate::new("monitor")));
    PlatformAdapter::builder(PlatformContext::new("integration")).readiness_gates(library, monitor)
}

fn running_adapter(config: &str) -> PlatformAdapter {
    let adapter = isolated_builder().build().expect("adapter");
    adapter
        .run(Configuration::text(config), LogLevel::Off, None)
        .expect("engine run");
    adapter
}

struct MissingLibrary;

impl NativeLibraryLoader for MissingLibrary {
    fn load(&self, _context: &PlatformContext) -> Result<(), PlatformError> {
        Err(PlatformError::NativeLibraryUnavailable {
            reason: "not bundled".to_string(),
        })
    }
}

/// Callbacks collecting every event per stream.
#[derive(Default)]
struct Collector {
    events: Mutex<Vec<(StreamId, String)>>,
    terminals: AtomicUsize,
    done: Mutex<Option<mpsc::Sender<StreamId>>>,
}

impl Collector {
    fn with_signal() -> (Arc<Self>, mpsc::Receiver<StreamId>) {
        let (tx, rx) = mpsc::channel();
        let collector = Collector {
            done: Mutex::new(Some(tx)),
            ..Collector::default()
        };
        (Arc::new(collector), rx)
    }

    fn push(&self, id: StreamId, what: String) {
        self.events.lock().unwrap().push((id, what));
    }

    fn terminal(&self, id: StreamId, what: &str) {
        self.push(id, what.to_string());
        self.terminals.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = self.done.lock().unwrap().as_ref() {
            let _ = tx.send(id);
        }
    }
}

impl StreamCallbacks for Collector {
    fn on_headers(&self, id: StreamId, headers: Headers, _end_stream: bool) {
        self.push(id, format!("headers {}", headers.get(":status").unwrap_or("?")));
    }

    fn on_data(&self, id: StreamId, data: Bytes, _end_stream: bool) {
        self.push(id, format!("data {}", String::from_utf8_lossy(&data)));
    }

    fn on_trailers(&self, id: StreamId, _trailers: Headers) {
        self.push(id, "trailers".to_string());
    }

    fn on_error(&self, id: StreamId, error: StreamError) {
        self.terminal(id, &format!("error {:?}", error.kind));
    }

    fn on_cancel(&self, id: StreamId) {
        self.terminal(id, "cancel");
    }

    fn on_complete(&self, id: StreamId) {
        self.terminal(id, "complete");
    }
}

#[test]
fn test_library_failure_means_no_engine() {
    let result = isolated_builder().library_loader(MissingLibrary).build();

    match result {
        Err(err) => {
            assert_eq!(err.code(), EngineErrorCodes::PLATFORM_PRECONDITION);
            assert!(err.is_fatal());
        }
        Ok(_) => panic!("adapter must not be created without the native library"),
    }
}

#[test]
fn test_run_lifecycle_and_second_run() {
    let adapter = isolated_builder().build().expect("adapter");
    let (ready_tx, ready_rx) = mpsc::channel();

    adapter
        .run(
            Configuration::text("{}"),
            LogLevel::Debug,
            Some(Box::new(move || {
                let _ = ready_tx.send(());
            })),
        )
        .expect("first run");
    ready_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("on_running fired");

    let second = adapter.run(Configuration::text("{}"), LogLevel::Debug, None);
    assert_eq!(second, Err(EngineError::AlreadyRunning));
    assert!(adapter.core().is_running());
}

#[test]
fn test_rejected_configuration_leaves_engine_stopped() {
    let adapter = isolated_builder().build().expect("adapter");

    let err = adapter
        .run(
            Configuration::text(r#"{"transport": {"max_concurrent_streams": 0}}"#),
            LogLevel::Off,
            None,
        )
        .unwrap_err();

    assert_eq!(err.code(), EngineErrorCodes::INVALID_CONFIGURATION);
    assert!(!adapter.core().is_running());
    let (collector, _rx) = Collector::with_signal();
    assert_eq!(
        adapter.start_stream(collector).unwrap_err(),
        EngineError::NotRunning
    );
}

#[test]
fn test_callback_stream_round_trip() {
    let adapter = running_adapter("{}");
    let (collector, done) = Collector::with_signal();

    let handle = adapter.start_stream(collector.clone()).expect("stream");
    handle
        .send_headers(
            Headers::new()
                .with(":method", "POST")
                .with("x-loopback-status", "201"),
            false,
        )
        .unwrap();
    handle.send_data(b"payload".to_vec(), false).unwrap();
    handle
        .send_trailers(Headers::new().with("grpc-status", "0"))
        .unwrap();

    assert_eq!(done.recv_timeout(Duration::from_secs(5)).unwrap(), handle.id());
    let events = collector.events.lock().unwrap().clone();
    let kinds: Vec<&str> = events.iter().map(|(_, what)| what.as_str()).collect();
    assert_eq!(kinds, vec!["headers 201", "data payload", "trailers", "complete"]);
    assert!(handle.send_data(b"late".to_vec(), true).is_err());
}

#[test]
fn test_many_concurrent_streams_deliver_independently() {
    let adapter = Arc::new(running_adapter("{}"));
    let (collector, done) = Collector::with_signal();

    let threads: Vec<_> = (0..32)
        .map(|n| {
            let adapter = Arc::clone(&adapter);
            let collector = Arc::clone(&collector);
            std::thread::spawn(move || {
                let handle = adapter.start_stream(collector).expect("stream");
                handle.send_data(format!("body-{n}").into_bytes(), true).unwrap();
                (handle.id(), n)
            })
        })
        .collect();
    let started: Vec<(StreamId, usize)> = threads.into_iter().map(|t| t.join().unwrap()).collect();

    for _ in 0..32 {
        done.recv_timeout(Duration::from_secs(5)).unwrap();
    }
    assert_eq!(collector.terminals.load(Ordering::SeqCst), 32);

    let events = collector.events.lock().unwrap().clone();
    for (id, n) in started {
        let bodies: Vec<&str> = events
            .iter()
            .filter(|(owner, what)| *owner == id && what.starts_with("data"))
            .map(|(_, what)| what.as_str())
            .collect();
        assert_eq!(bodies, vec![format!("data body-{n}")]);
    }
}

#[test]
fn test_concurrency_limit_reports_buffer_error() {
    let adapter = running_adapter(r#"{"transport": {"max_concurrent_streams": 1}}"#);
    let (first, mut first_events) = adapter.core().open_stream().unwrap();
    let (_second, mut second_events) = adapter.core().open_stream().unwrap();

    match second_events.blocking_recv() {
        Some(StreamEvent::Error(err)) => {
            assert_eq!(err.kind, StreamErrorKind::BufferLimitExceeded)
        }
        other => panic!("Expected buffer error, got {:?}", other),
    }

    assert!(first.cancel());
    assert_eq!(first_events.blocking_recv(), Some(StreamEvent::Cancel));
    assert_eq!(first_events.blocking_recv(), None);
}

#[test]
fn test_counters_before_and_after_run() {
    let adapter = isolated_builder().build().expect("adapter");
    let early = adapter.record_counter("integration.early", 1);
    assert_eq!(early, Err(EngineError::NotRunning));

    adapter
        .run(Configuration::text("{}"), LogLevel::Off, None)
        .unwrap();
    for _ in 0..100 {
        adapter.record_counter("integration.hits", 1).unwrap();
    }

    let snapshot = adapter.core().flush_stats().unwrap();
    assert_eq!(snapshot.get("integration.hits"), Some(100));
    assert_eq!(snapshot.get("integration.early"), None);
}

#[tokio::test]
async fn test_stream_events_as_futures_stream() {
    let adapter = running_adapter("{}");
    let (handle, events) = adapter.core().open_stream().unwrap();
    handle.send_data(b"async".to_vec(), true).unwrap();

    let collected: Vec<StreamEvent> =
        tokio::time::timeout(Duration::from_secs(5), events.collect::<Vec<_>>())
            .await
            .expect("stream finished");

    assert_eq!(collected.len(), 3);
    assert_eq!(collected.last(), Some(&StreamEvent::Complete));
}
