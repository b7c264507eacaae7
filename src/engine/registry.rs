//! Concurrent registry of in-flight streams.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{StreamError, StreamErrorKind};
use crate::stats::{StatsStore, STREAMS_CANCELLED, STREAMS_COMPLETED, STREAMS_ERRORED};
use crate::stream::{StreamEvent, StreamId, StreamShared};
use crate::telemetry::{EngineEvent, StreamOutcome, TelemetryCollector};

/// Tracks every stream between registration and its terminal event.
///
/// Entries are removed by the stream itself when its terminal event is
/// posted, so the map only ever holds live streams.
pub struct StreamRegistry {
    streams: DashMap<StreamId, Arc<StreamShared>>,
    next_id: AtomicU64,
    stats: Arc<StatsStore>,
    telemetry: Arc<TelemetryCollector>,
}

impl StreamRegistry {
    pub fn new(stats: Arc<StatsStore>, telemetry: Arc<TelemetryCollector>) -> Self {
        Self {
            streams: DashMap::new(),
            next_id: AtomicU64::new(1),
            stats,
            telemetry,
        }
    }

    pub(crate) fn allocate_id(&self) -> StreamId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn register(&self, shared: Arc<StreamShared>) {
        let id = shared.id();
        self.streams.insert(id, shared);
        self.telemetry.publish(EngineEvent::StreamOpened { stream_id: id });
    }

    /// Called exactly once per stream, by whoever posted its terminal event.
    pub(crate) fn release(&self, id: StreamId, outcome: StreamOutcome) {
        if self.streams.remove(&id).is_none() {
            return;
        }
        let counter = match outcome {
            StreamOutcome::Completed => STREAMS_COMPLETED,
            StreamOutcome::Errored => STREAMS_ERRORED,
            StreamOutcome::Cancelled => STREAMS_CANCELLED,
        };
        self.stats.increment(counter, 1);
        self.telemetry.publish(EngineEvent::StreamClosed {
            stream_id: id,
            outcome,
        });
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn contains(&self, id: StreamId) -> bool {
        self.streams.contains_key(&id)
    }

    /// Fail every live stream with `EngineShutdown`.
    pub(crate) fn fail_all(&self, reason: &str) -> usize {
        // Collect first: posting the terminal event removes the entry, which
        // must not happen while a shard lock is held by iteration.
        let live: Vec<Arc<StreamShared>> = self
            .streams
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        live.iter()
            .filter(|shared| {
                shared.post(StreamEvent::Error(StreamError::new(
                    StreamErrorKind::EngineShutdown,
                    reason,
                )))
            })
            .count()
    }
}
