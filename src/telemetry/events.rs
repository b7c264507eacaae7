//! Engine telemetry event types exposed to CLI/HTTP surfaces and subscribers.

use serde::{Deserialize, Serialize};

use crate::stats::StatsSnapshot;

/// Application lifecycle transitions reported by the host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Foreground,
    Background,
}

/// How a stream ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamOutcome {
    Completed,
    Errored,
    Cancelled,
}

/// Engine lifecycle, stream, and stats events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EngineEvent {
    EngineStarted {
        startup_ms: u64,
    },
    StartupFailed {
        code: i32,
        message: String,
    },
    StreamOpened {
        stream_id: u64,
    },
    StreamClosed {
        stream_id: u64,
        outcome: StreamOutcome,
    },
    StatsFlushed {
        snapshot: StatsSnapshot,
    },
    Lifecycle {
        phase: LifecyclePhase,
        timestamp_ms: u64,
    },
}
