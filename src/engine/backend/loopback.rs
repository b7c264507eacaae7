use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use once_cell::sync::OnceCell;
use rand::Rng;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::config::TransportConfig;
use crate::error::{EngineError, StreamError, StreamErrorKind};
use crate::stream::{Headers, Outbound, StreamId};

use super::{TransportCore, TransportStream};

/// Request header selecting an injected failure (`timeout`, `reset`, `connection`).
pub const FAIL_HEADER: &str = "x-loopback-fail";
/// Request header overriding the response `:status`.
pub const STATUS_HEADER: &str = "x-loopback-status";

/// In-process transport core that answers every request itself.
///
/// Each request is echoed back: request headers come back as `x-echo-*`,
/// the body is returned as-is, and request trailers are mirrored. Used by
/// desktop builds, the CLI, and tests in place of a real protocol stack.
pub struct LoopbackTransport {
    config: OnceCell<TransportConfig>,
    runtime: OnceCell<Handle>,
    active: Arc<AtomicUsize>,
    shutdown_tx: watch::Sender<bool>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config: OnceCell::new(),
            runtime: OnceCell::new(),
            active: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    fn reserve_slot(&self, limit: usize) -> Option<ActiveSlot> {
        let previous = self.active.fetch_add(1, Ordering::SeqCst);
        if previous >= limit {
            self.active.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(ActiveSlot(Arc::clone(&self.active)))
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportCore for LoopbackTransport {
    fn start(&self, config: &TransportConfig, runtime: &Handle) -> Result<(), EngineError> {
        self.config
            .set(config.clone())
            .map_err(|_| EngineError::TransportInit {
                reason: "loopback transport already started".to_string(),
            })?;
        let _ = self.runtime.set(runtime.clone());
        log::info!(
            "[Loopback] Started (max_concurrent_streams={}, idle_timeout={}ms)",
            config.max_concurrent_streams,
            config.stream_idle_timeout_ms
        );
        Ok(())
    }

    fn open_stream(&self, stream: TransportStream) -> Result<(), StreamError> {
        let (config, runtime) = match (self.config.get(), self.runtime.get()) {
            (Some(config), Some(runtime)) => (config, runtime),
            _ => {
                return Err(StreamError::new(
                    StreamErrorKind::ConnectionFailure,
                    "loopback transport not started",
                ))
            }
        };

        let slot = self.reserve_slot(config.max_concurrent_streams).ok_or_else(|| {
            StreamError::new(
                StreamErrorKind::BufferLimitExceeded,
                format!(
                    "more than {} concurrent streams",
                    config.max_concurrent_streams
                ),
            )
        })?;

        runtime.spawn(serve(
            stream,
            config.clone(),
            slot,
            self.shutdown_tx.subscribe(),
        ));
        Ok(())
    }

    fn active_streams(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Releases a concurrency slot when the serving task ends.
struct ActiveSlot(Arc<AtomicUsize>);

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct LoopbackRequest {
    headers: Headers,
    body: Vec<u8>,
    trailers: Option<Headers>,
    ended: bool,
}

impl LoopbackRequest {
    fn apply(&mut self, frame: Outbound) {
        match frame {
            Outbound::Headers {
                headers,
                end_stream,
            } => {
                self.headers = headers;
                self.ended = end_stream;
            }
            Outbound::Data { data, end_stream } => {
                self.body.extend_from_slice(&data);
                self.ended = end_stream;
            }
            Outbound::Trailers(trailers) => {
                self.trailers = Some(trailers);
                self.ended = true;
            }
            Outbound::Cancel => {}
        }
    }

    fn injected_failure(&self) -> Option<StreamErrorKind> {
        match self.headers.get(FAIL_HEADER)? {
            "timeout" => Some(StreamErrorKind::Timeout),
            "reset" => Some(StreamErrorKind::Reset),
            "connection" => Some(StreamErrorKind::ConnectionFailure),
            _ => None,
        }
    }

    fn response_headers(&self, id: StreamId) -> Headers {
        let status = self
            .headers
            .get(STATUS_HEADER)
            .and_then(|raw| raw.parse::<u16>().ok())
            .filter(|code| (100..=599).contains(code))
            .unwrap_or(200);

        let mut headers = Headers::new()
            .with(":status", status.to_string())
            .with("x-stream-id", id.to_string());
        for (name, value) in self.headers.iter() {
            if name.starts_with("x-loopback-") {
                continue;
            }
            let echoed = name.trim_start_matches(':');
            headers.insert(format!("x-echo-{}", echoed), value);
        }
        headers
    }
}

fn response_delay(config: &TransportConfig) -> Duration {
    let jitter = if config.response_jitter_ms > 0 {
        rand::thread_rng().gen_range(0..=config.response_jitter_ms)
    } else {
        0
    };
    Duration::from_millis(config.response_delay_ms + jitter)
}

async fn serve(
    stream: TransportStream,
    config: TransportConfig,
    _slot: ActiveSlot,
    mut shutdown: watch::Receiver<bool>,
) {
    let TransportStream {
        id,
        mut outbound,
        events,
    } = stream;
    let idle = Duration::from_millis(config.stream_idle_timeout_ms);
    let mut request = LoopbackRequest::default();

    while !request.ended {
        let frame = tokio::select! {
            _ = shutdown.changed() => {
                events.error(StreamError::new(
                    StreamErrorKind::EngineShutdown,
                    "loopback transport shut down",
                ));
                return;
            }
            frame = tokio::time::timeout(idle, outbound.recv()) => frame,
        };

        match frame {
            Err(_) => {
                events.error(StreamError::new(
                    StreamErrorKind::Timeout,
                    format!("no request activity for {}ms", config.stream_idle_timeout_ms),
                ));
                return;
            }
            Ok(None) => {
                events.error(StreamError::new(
                    StreamErrorKind::Reset,
                    "request abandoned before it was complete",
                ));
                return;
            }
            Ok(Some(Outbound::Cancel)) => {
                log::debug!("[Loopback] Stream {} cancelled during request", id);
                return;
            }
            Ok(Some(frame)) => request.apply(frame),
        }
    }

    if let Some(kind) = request.injected_failure() {
        events.error(StreamError::new(kind, "injected loopback failure").with_attempts(1));
        return;
    }

    let delay = response_delay(&config);
    if !delay.is_zero() {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        let mut outbound_open = true;
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                _ = shutdown.changed() => {
                    events.error(StreamError::new(
                        StreamErrorKind::EngineShutdown,
                        "loopback transport shut down",
                    ));
                    return;
                }
                frame = outbound.recv(), if outbound_open => match frame {
                    Some(Outbound::Cancel) => return,
                    Some(_) => {}
                    None => outbound_open = false,
                },
            }
        }
    }

    if events.is_closed() {
        return;
    }

    let has_body = !request.body.is_empty();
    let trailers = request.trailers.take();
    let headers = request.response_headers(id);

    events.headers(headers, !has_body && trailers.is_none());
    if has_body {
        events.data(Bytes::from(std::mem::take(&mut request.body)), trailers.is_none());
    }
    if let Some(trailers) = trailers {
        let echoed = trailers
            .iter()
            .map(|(name, value)| (format!("x-echo-{}", name), value.to_string()))
            .collect();
        events.trailers(echoed);
    }
    events.complete();
}
