use super::*;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::{Configuration, LogLevel};
use crate::engine::Engine;
use crate::error::{EngineError, ErrorCode};
use crate::lifecycle::LifecycleHook;
use crate::telemetry::{EngineEvent, LifecyclePhase};

/// Fresh gates so tests never share process-wide readiness.
fn isolated_gates() -> (&'static ReadinessGate, &'static ReadinessGate) {
    (
        Box::leak(Box::new(ReadinessGate::new("test library"))),
        Box::leak(Box::new(ReadinessGate::new("test monitor"))),
    )
}

#[derive(Clone, Default)]
struct CountingLoader {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl NativeLibraryLoader for CountingLoader {
    fn load(&self, _context: &PlatformContext) -> Result<(), PlatformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(PlatformError::NativeLibraryUnavailable {
                reason: "missing libnetmux.so".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Default)]
struct CountingMonitor {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl NetworkMonitor for CountingMonitor {
    fn ensure_active(&self, _context: &PlatformContext) -> Result<(), PlatformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(PlatformError::NetworkMonitorUnavailable {
                reason: "no connectivity service".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct CountingHook {
    backgrounds: AtomicUsize,
}

impl LifecycleHook for CountingHook {
    fn on_transition(&self, phase: LifecyclePhase, _engine: &crate::engine::EngineCore) {
        if phase == LifecyclePhase::Background {
            self.backgrounds.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn builder(loader: CountingLoader, monitor: CountingMonitor) -> PlatformAdapterBuilder {
    let (library, network) = isolated_gates();
    PlatformAdapter::builder(PlatformContext::new("tests"))
        .library_loader(loader)
        .network_monitor(monitor)
        .readiness_gates(library, network)
}

#[test]
fn readiness_gate_runs_init_once() {
    let gate = ReadinessGate::new("once");
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
        gate.ensure(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    }

    assert!(gate.is_ready());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn readiness_gate_retries_after_failure() {
    let gate = ReadinessGate::new("retry");

    let err = gate.ensure(|| Err(PlatformError::ContextMissing)).unwrap_err();
    assert_eq!(err, PlatformError::ContextMissing);
    assert!(!gate.is_ready());

    gate.ensure(|| Ok(())).unwrap();
    assert!(gate.is_ready());
}

#[test]
fn readiness_gate_is_shared_across_threads() {
    let gate: &'static ReadinessGate = Box::leak(Box::new(ReadinessGate::new("threads")));
    let calls = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let calls = Arc::clone(&calls);
            std::thread::spawn(move || {
                gate.ensure(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(10));
                    Ok(())
                })
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap().unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn library_failure_prevents_engine_creation() {
    let loader = CountingLoader {
        fail: true,
        ..CountingLoader::default()
    };
    let monitor = CountingMonitor::default();

    let err = builder(loader.clone(), monitor.clone()).build().err().unwrap();

    assert!(matches!(
        err,
        EngineError::PlatformPrecondition(PlatformError::NativeLibraryUnavailable { .. })
    ));
    assert_eq!(err.code(), 1009);
    assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    assert_eq!(monitor.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn monitor_failure_prevents_engine_creation() {
    let monitor = CountingMonitor {
        fail: true,
        ..CountingMonitor::default()
    };

    let err = builder(CountingLoader::default(), monitor).build().err().unwrap();

    assert!(matches!(
        err,
        EngineError::PlatformPrecondition(PlatformError::NetworkMonitorUnavailable { .. })
    ));
}

#[test]
fn preconditions_run_once_per_gate() {
    let (library, network) = isolated_gates();
    let loader = CountingLoader::default();
    let monitor = CountingMonitor::default();

    for _ in 0..3 {
        PlatformAdapter::builder(PlatformContext::new("tests"))
            .library_loader(loader.clone())
            .network_monitor(monitor.clone())
            .readiness_gates(library, network)
            .build()
            .unwrap();
    }

    assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    assert_eq!(monitor.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn platform_without_monitor_skips_step() {
    let monitor = CountingMonitor {
        fail: true,
        ..CountingMonitor::default()
    };

    let adapter = builder(CountingLoader::default(), monitor.clone())
        .without_network_monitor()
        .build()
        .unwrap();

    assert_eq!(adapter.context().app_id, "tests");
    assert_eq!(monitor.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn adapter_forwards_engine_calls() {
    let adapter = builder(CountingLoader::default(), CountingMonitor::default())
        .build()
        .unwrap();

    assert_eq!(
        adapter.record_counter("app.early", 1),
        Err(EngineError::NotRunning)
    );

    adapter
        .run(Configuration::text("{}"), LogLevel::Off, None)
        .unwrap();
    assert!(adapter.core().is_running());
    assert_eq!(
        adapter.run(Configuration::text("{}"), LogLevel::Off, None),
        Err(EngineError::AlreadyRunning)
    );

    adapter.record_counter("app.late", 4).unwrap();
    assert_eq!(adapter.core().stats_snapshot().get("app.late"), Some(4));
}

#[test]
fn lifecycle_flushing_follows_configuration() {
    let adapter = builder(CountingLoader::default(), CountingMonitor::default())
        .build()
        .unwrap();
    adapter
        .run(
            Configuration::text(r#"{"stats": {"lifecycle_flushing": true}}"#),
            LogLevel::Off,
            None,
        )
        .unwrap();

    adapter.on_lifecycle(LifecyclePhase::Background);

    let recent = adapter.core().telemetry_snapshot().recent;
    assert!(recent
        .iter()
        .any(|event| matches!(event, EngineEvent::Lifecycle { phase: LifecyclePhase::Background, .. })));
    assert!(recent
        .iter()
        .any(|event| matches!(event, EngineEvent::StatsFlushed { .. })));
}

#[test]
fn lifecycle_flushing_is_off_by_default() {
    let adapter = builder(CountingLoader::default(), CountingMonitor::default())
        .build()
        .unwrap();
    adapter
        .run(Configuration::text("{}"), LogLevel::Off, None)
        .unwrap();

    adapter.on_lifecycle(LifecyclePhase::Background);

    let recent = adapter.core().telemetry_snapshot().recent;
    assert!(!recent
        .iter()
        .any(|event| matches!(event, EngineEvent::StatsFlushed { .. })));
}

#[test]
fn explicit_lifecycle_hook_wins() {
    let hook = Arc::new(CountingHook::default());
    let adapter = builder(CountingLoader::default(), CountingMonitor::default())
        .lifecycle_hook(Arc::clone(&hook) as Arc<dyn LifecycleHook>)
        .build()
        .unwrap();
    adapter
        .run(
            Configuration::text(r#"{"stats": {"lifecycle_flushing": true}}"#),
            LogLevel::Off,
            None,
        )
        .unwrap();

    adapter.on_lifecycle(LifecyclePhase::Foreground);
    adapter.on_lifecycle(LifecyclePhase::Background);

    assert_eq!(hook.backgrounds.load(Ordering::SeqCst), 1);
}

#[cfg(not(target_os = "android"))]
#[test]
fn desktop_loader_checks_library_path() {
    let missing = PlatformContext::new("tests").with_library_path("/nonexistent/libnetmux.so");
    assert!(matches!(
        DesktopLibraryLoader.load(&missing),
        Err(PlatformError::NativeLibraryUnavailable { .. })
    ));
    assert!(DesktopLibraryLoader.load(&PlatformContext::new("tests")).is_ok());
}
