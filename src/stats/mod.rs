//! Best-effort counters and their flush pipeline.
//!
//! Counters are keyed by dotted names (`app.requests.retried`) and only grow.
//! Recording never blocks the caller beyond a shard-level map update.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::telemetry::{EngineEvent, TelemetryCollector};

pub const STREAMS_STARTED: &str = "netmux.streams.started";
pub const STREAMS_COMPLETED: &str = "netmux.streams.completed";
pub const STREAMS_ERRORED: &str = "netmux.streams.errored";
pub const STREAMS_CANCELLED: &str = "netmux.streams.cancelled";

/// Check that `name` is a dot-separated list of `[A-Za-z0-9_-]+` elements.
pub fn validate_counter_name(name: &str) -> Result<(), EngineError> {
    let valid = !name.is_empty()
        && name.split('.').all(|element| {
            !element.is_empty()
                && element
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        });

    if valid {
        Ok(())
    } else {
        Err(EngineError::InvalidCounterName {
            name: name.to_string(),
        })
    }
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub taken_at_ms: u64,
}

impl StatsSnapshot {
    pub fn get(&self, name: &str) -> Option<u64> {
        self.counters.get(name).copied()
    }
}

/// Concurrent counter store.
#[derive(Default)]
pub struct StatsStore {
    counters: DashMap<String, u64>,
}

impl StatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `name` and add `count` to it.
    pub fn record(&self, name: &str, count: u64) -> Result<(), EngineError> {
        validate_counter_name(name)?;
        self.increment(name, count);
        Ok(())
    }

    pub(crate) fn increment(&self, name: &str, count: u64) {
        if let Some(mut value) = self.counters.get_mut(name) {
            *value = value.saturating_add(count);
            return;
        }
        self.counters
            .entry(name.to_string())
            .and_modify(|value| *value = value.saturating_add(count))
            .or_insert(count);
    }

    pub fn value(&self, name: &str) -> Option<u64> {
        self.counters.get(name).map(|value| *value)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            counters: self
                .counters
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
            taken_at_ms: now_timestamp_ms(),
        }
    }
}

/// Cloneable handle that snapshots counters and publishes the result.
#[derive(Clone)]
pub struct StatsFlusher {
    stats: Arc<StatsStore>,
    telemetry: Arc<TelemetryCollector>,
}

impl StatsFlusher {
    pub fn new(stats: Arc<StatsStore>, telemetry: Arc<TelemetryCollector>) -> Self {
        Self { stats, telemetry }
    }

    pub fn flush(&self) -> StatsSnapshot {
        let snapshot = self.stats.snapshot();
        log::debug!(
            "[Stats] Flushing {} counters",
            snapshot.counters.len()
        );
        self.telemetry.publish(EngineEvent::StatsFlushed {
            snapshot: snapshot.clone(),
        });
        snapshot
    }
}

pub(crate) fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
