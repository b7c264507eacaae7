//! Engine telemetry collector.
//!
//! The collector multiplexes lifecycle, stream, and stats events into a
//! bounded history plus an async broadcast stream.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;

pub mod events;

pub use events::{EngineEvent, LifecyclePhase, StreamOutcome};

/// Snapshot of collector state for HTTP/CLI reporting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<EngineEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
}

/// Broadcast-based collector retaining a bounded history of events.
pub struct TelemetryCollector {
    tx: broadcast::Sender<EngineEvent>,
    history: Mutex<VecDeque<EngineEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: EngineEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        if self.history_capacity > 0 {
            let mut history = self.lock_history();
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            history.push_back(event.clone());
        }

        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let history = self.lock_history();
        TelemetrySnapshot {
            recent: history.iter().cloned().collect(),
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_history.load(Ordering::Relaxed),
        }
    }

    // History is append-only; a panic mid-push cannot leave it inconsistent.
    fn lock_history(&self) -> MutexGuard<'_, VecDeque<EngineEvent>> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_preserves_order_within_history() {
        let collector = TelemetryCollector::new(8, 3);
        collector.publish(EngineEvent::StreamOpened { stream_id: 1 });
        collector.publish(EngineEvent::StreamOpened { stream_id: 2 });
        collector.publish(EngineEvent::StreamClosed {
            stream_id: 1,
            outcome: StreamOutcome::Completed,
        });

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent.len(), 3);
        assert_eq!(snapshot.recent[0], EngineEvent::StreamOpened { stream_id: 1 });
        assert!(matches!(
            snapshot.recent[2],
            EngineEvent::StreamClosed { .. }
        ));
    }

    #[test]
    fn collector_drops_history_when_full() {
        let collector = TelemetryCollector::new(8, 2);
        for stream_id in 1..=3 {
            collector.publish(EngineEvent::StreamOpened { stream_id });
        }

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent.len(), 2);
        assert_eq!(snapshot.total_events, 3);
        assert_eq!(snapshot.dropped_events, 1);
        assert_eq!(snapshot.recent[0], EngineEvent::StreamOpened { stream_id: 2 });
    }

    #[test]
    fn subscribers_receive_published_events() {
        let collector = TelemetryCollector::new(8, 0);
        let mut rx = collector.subscribe();
        collector.publish(EngineEvent::EngineStarted { startup_ms: 3 });

        assert_eq!(
            rx.try_recv().unwrap(),
            EngineEvent::EngineStarted { startup_ms: 3 }
        );
        assert!(collector.snapshot().recent.is_empty());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(EngineEvent::StreamClosed {
            stream_id: 5,
            outcome: StreamOutcome::Cancelled,
        })
        .unwrap();
        assert_eq!(json["type"], "stream_closed");
        assert_eq!(json["payload"]["outcome"], "cancelled");
    }
}
