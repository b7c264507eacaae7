use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use crate::engine::EngineCore;
use crate::telemetry::EngineEvent;

pub type EngineEventStream = Sse<Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>>;

/// Build a Server-Sent Events stream of engine telemetry.
///
/// Lagged receivers skip the missed events rather than closing the stream.
pub fn engine_events(engine: &'static EngineCore) -> EngineEventStream {
    let stream = BroadcastStream::new(engine.subscribe_events()).filter_map(|result| async move {
        let event = result.ok()?;
        let payload = serde_json::to_string(&event).ok()?;
        Some(Ok(Event::default().event(event_name(&event)).data(payload)))
    });

    Sse::new(Box::pin(stream) as Pin<Box<_>>).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(5))
            .text("netmux-keepalive"),
    )
}

fn event_name(event: &EngineEvent) -> &'static str {
    match event {
        EngineEvent::EngineStarted { .. } => "engine_started",
        EngineEvent::StartupFailed { .. } => "startup_failed",
        EngineEvent::StreamOpened { .. } => "stream_opened",
        EngineEvent::StreamClosed { .. } => "stream_closed",
        EngineEvent::StatsFlushed { .. } => "stats_flushed",
        EngineEvent::Lifecycle { .. } => "lifecycle",
    }
}
