//! Application lifecycle hooks.
//!
//! Hosts report foreground/background transitions through
//! `PlatformAdapter::on_lifecycle`. Stats flushing on background is opt-in:
//! the default hook ignores every transition.

use crate::engine::EngineCore;
use crate::telemetry::LifecyclePhase;

/// Reacts to application lifecycle transitions.
pub trait LifecycleHook: Send + Sync {
    fn on_transition(&self, phase: LifecyclePhase, engine: &EngineCore);
}

/// Hook that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledLifecycleHook;

impl LifecycleHook for DisabledLifecycleHook {
    fn on_transition(&self, _phase: LifecyclePhase, _engine: &EngineCore) {}
}

/// Flushes counters when the application moves to the background.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlushOnBackground;

impl LifecycleHook for FlushOnBackground {
    fn on_transition(&self, phase: LifecyclePhase, engine: &EngineCore) {
        if phase != LifecyclePhase::Background {
            return;
        }
        match engine.flush_stats() {
            Ok(snapshot) => log::debug!(
                "[Lifecycle] Flushed {} counters on background",
                snapshot.counters.len()
            ),
            Err(err) => log::debug!("[Lifecycle] Skipped background flush: {}", err),
        }
    }
}
