//! EngineCore: owns the transport core and multiplexes streams over it.
//!
//! The core is created unstarted. `run` resolves the configuration, builds
//! the engine-owned tokio runtime, and starts the transport core on it; only
//! then do `start_stream` and `record_counter` do anything. A failed `run`
//! leaves the instance terminated.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::{broadcast, mpsc};

use crate::config::{Configuration, EngineConfig, LogLevel};
use crate::engine::backend::{LoopbackTransport, TransportCore, TransportStream};
use crate::engine::registry::StreamRegistry;
use crate::engine::{Engine, OnEngineRunning};
use crate::error::{log_engine_error, EngineError, ErrorCode, StreamError, StreamErrorKind};
use crate::stats::{StatsFlusher, StatsSnapshot, StatsStore, STREAMS_STARTED};
use crate::stream::{
    SinkRegistry, StreamCallbacks, StreamEventSender, StreamEvents, StreamHandle, StreamShared,
};
use crate::telemetry::{EngineEvent, TelemetryCollector, TelemetrySnapshot};

const STATE_UNSTARTED: u8 = 0;
const STATE_STARTING: u8 = 1;
const STATE_RUNNING: u8 = 2;
const STATE_FAILED: u8 = 3;

/// Observable engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Unstarted,
    Starting,
    Running,
    Failed,
}

/// EngineCore drives one transport core and every stream opened on it.
pub struct EngineCore {
    state: AtomicU8,
    transport: Arc<dyn TransportCore>,
    registry: Arc<StreamRegistry>,
    sinks: Arc<SinkRegistry>,
    stats: Arc<StatsStore>,
    telemetry: Arc<TelemetryCollector>,
    runtime: OnceCell<Runtime>,
    config: OnceCell<EngineConfig>,
}

impl EngineCore {
    /// Create an engine backed by the in-process loopback transport.
    pub fn new() -> Self {
        Self::with_transport(Arc::new(LoopbackTransport::new()))
    }

    pub fn with_transport(transport: Arc<dyn TransportCore>) -> Self {
        let stats = Arc::new(StatsStore::new());
        let telemetry = Arc::new(TelemetryCollector::default());
        let registry = Arc::new(StreamRegistry::new(
            Arc::clone(&stats),
            Arc::clone(&telemetry),
        ));

        Self {
            state: AtomicU8::new(STATE_UNSTARTED),
            transport,
            registry,
            sinks: Arc::new(SinkRegistry::new()),
            stats,
            telemetry,
            runtime: OnceCell::new(),
            config: OnceCell::new(),
        }
    }

    pub fn state(&self) -> EngineState {
        match self.state.load(Ordering::SeqCst) {
            STATE_UNSTARTED => EngineState::Unstarted,
            STATE_STARTING => EngineState::Starting,
            STATE_RUNNING => EngineState::Running,
            _ => EngineState::Failed,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_RUNNING
    }

    /// Configuration accepted by a successful `run`.
    pub fn config(&self) -> Option<&EngineConfig> {
        self.config.get()
    }

    /// Open a stream and return its handle plus the receiver of its events.
    ///
    /// The caller drains [`StreamEvents`] itself; `start_stream` is this plus
    /// an engine-side drain task feeding callbacks.
    pub fn open_stream(&self) -> Result<(StreamHandle, StreamEvents), EngineError> {
        self.running_handle()?;

        let id = self.registry.allocate_id();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(StreamShared::new(
            id,
            events_tx,
            Arc::downgrade(&self.registry),
        ));

        self.registry.register(Arc::clone(&shared));
        self.stats.increment(STREAMS_STARTED, 1);

        let sender = StreamEventSender::new(Arc::clone(&shared));
        let stream = TransportStream {
            id,
            outbound: outbound_rx,
            events: sender.clone(),
        };
        if let Err(err) = self.transport.open_stream(stream) {
            log::warn!("[EngineCore] Transport rejected stream {}: {}", id, err);
            sender.error(err);
        }

        Ok((
            StreamHandle::new(shared, outbound_tx),
            StreamEvents::new(id, events_rx),
        ))
    }

    /// Snapshot every counter and publish the result as an engine event.
    pub fn flush_stats(&self) -> Result<StatsSnapshot, EngineError> {
        if !self.is_running() {
            return Err(EngineError::NotRunning);
        }
        Ok(self.stats_flusher().flush())
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn stats_flusher(&self) -> StatsFlusher {
        StatsFlusher::new(Arc::clone(&self.stats), Arc::clone(&self.telemetry))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.telemetry.subscribe()
    }

    pub fn telemetry(&self) -> Arc<TelemetryCollector> {
        Arc::clone(&self.telemetry)
    }

    pub fn telemetry_snapshot(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    /// Streams opened and not yet terminated.
    pub fn active_streams(&self) -> usize {
        self.registry.len()
    }

    fn running_handle(&self) -> Result<&Handle, EngineError> {
        if !self.is_running() {
            return Err(EngineError::NotRunning);
        }
        self.runtime
            .get()
            .map(Runtime::handle)
            .ok_or(EngineError::NotRunning)
    }

    /// Resolve configuration, build the runtime, and start the transport.
    ///
    /// Returns the startup duration in milliseconds.
    fn start(&self, configuration: &Configuration) -> Result<u64, EngineError> {
        let started_at = Instant::now();
        let config = configuration.resolve()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.engine.worker_threads)
            .thread_name("netmux-engine")
            .enable_all()
            .build()
            .map_err(|err| EngineError::TransportInit {
                reason: format!("failed to build engine runtime: {}", err),
            })?;

        if let Err(err) = self.start_transport(&config, runtime.handle()) {
            // The transport thread may still be blocked; do not wait for it.
            runtime.shutdown_background();
            return Err(err);
        }

        spawn_stats_flusher(
            runtime.handle(),
            self.stats_flusher(),
            config.stats.flush_interval_ms,
        );

        let _ = self.runtime.set(runtime);
        let _ = self.config.set(config);
        Ok(started_at.elapsed().as_millis() as u64)
    }

    fn start_transport(&self, config: &EngineConfig, handle: &Handle) -> Result<(), EngineError> {
        let timeout_ms = config.engine.startup_timeout_ms;
        let (done_tx, done_rx) = std_mpsc::channel();
        let transport = Arc::clone(&self.transport);
        let transport_config = config.transport.clone();
        let transport_handle = handle.clone();

        handle.spawn_blocking(move || {
            let _ = done_tx.send(transport.start(&transport_config, &transport_handle));
        });

        match done_rx.recv_timeout(Duration::from_millis(timeout_ms)) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(EngineError::StartupTimeout { timeout_ms }),
            Err(RecvTimeoutError::Disconnected) => Err(EngineError::TransportInit {
                reason: "transport start aborted".to_string(),
            }),
        }
    }
}

fn spawn_stats_flusher(handle: &Handle, flusher: StatsFlusher, interval_ms: u64) {
    handle.spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            flusher.flush();
        }
    });
}

impl Engine for EngineCore {
    fn run(
        &self,
        configuration: Configuration,
        log_level: LogLevel,
        on_running: Option<OnEngineRunning>,
    ) -> Result<(), EngineError> {
        if let Err(current) = self.state.compare_exchange(
            STATE_UNSTARTED,
            STATE_STARTING,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            let err = if current == STATE_FAILED {
                EngineError::Terminated
            } else {
                EngineError::AlreadyRunning
            };
            log_engine_error(&err, "run");
            return Err(err);
        }

        crate::init_logging(log_level);

        match self.start(&configuration) {
            Ok(startup_ms) => {
                self.state.store(STATE_RUNNING, Ordering::SeqCst);
                log::info!(
                    "[EngineCore] Running after {}ms (log level {})",
                    startup_ms,
                    log_level
                );
                self.telemetry
                    .publish(EngineEvent::EngineStarted { startup_ms });

                if let (Some(on_running), Ok(handle)) = (on_running, self.running_handle()) {
                    handle.spawn(async move { on_running() });
                }
                Ok(())
            }
            Err(err) => {
                self.state.store(STATE_FAILED, Ordering::SeqCst);
                log_engine_error(&err, "run");
                self.telemetry.publish(EngineEvent::StartupFailed {
                    code: err.code(),
                    message: err.message(),
                });
                Err(err)
            }
        }
    }

    fn start_stream(
        &self,
        callbacks: Arc<dyn StreamCallbacks>,
    ) -> Result<StreamHandle, EngineError> {
        let (handle, events) = self.open_stream()?;
        self.sinks
            .spawn_delivery(self.running_handle()?, events, callbacks);
        Ok(handle)
    }

    fn record_counter(&self, name: &str, count: u64) -> Result<(), EngineError> {
        if !self.is_running() {
            return Err(EngineError::NotRunning);
        }
        self.stats.record(name, count)
    }
}

impl Default for EngineCore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EngineCore {
    fn drop(&mut self) {
        let failed = self.registry.fail_all("engine dropped");
        if failed > 0 {
            log::info!("[EngineCore] Failed {} live streams on drop", failed);
        }
        self.transport.shutdown();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }

        // Drain tasks no longer run; sinks that missed their terminal event
        // get it on this thread.
        let late = self.sinks.fail_undelivered(&StreamError::new(
            StreamErrorKind::EngineShutdown,
            "engine dropped",
        ));
        if late > 0 {
            log::info!("[EngineCore] Delivered shutdown to {} callback sinks on drop", late);
        }
    }
}
