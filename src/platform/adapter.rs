use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::config::{Configuration, LogLevel};
use crate::engine::{Engine, EngineCore, OnEngineRunning, TransportCore};
use crate::error::{log_platform_error, EngineError};
use crate::lifecycle::{DisabledLifecycleHook, FlushOnBackground, LifecycleHook};
use crate::stats::now_timestamp_ms;
use crate::stream::{StreamCallbacks, StreamHandle};
use crate::telemetry::{EngineEvent, LifecyclePhase};

use super::{
    default_library_loader, default_network_monitor, NativeLibraryLoader, NetworkMonitor,
    PlatformContext, ReadinessGate, NATIVE_LIBRARY, NETWORK_MONITOR,
};

/// Engine composed with platform preconditions.
///
/// Constructing one loads the native library and activates the network
/// monitor; if either fails no engine is created. Every [`Engine`] call is
/// forwarded unchanged to the wrapped [`EngineCore`].
pub struct PlatformAdapter {
    context: PlatformContext,
    engine: EngineCore,
    lifecycle: OnceCell<Arc<dyn LifecycleHook>>,
}

impl PlatformAdapter {
    /// Build an adapter with the current target's loader and monitor.
    pub fn new(context: PlatformContext) -> Result<Self, EngineError> {
        Self::builder(context).build()
    }

    pub fn builder(context: PlatformContext) -> PlatformAdapterBuilder {
        PlatformAdapterBuilder::new(context)
    }

    pub fn context(&self) -> &PlatformContext {
        &self.context
    }

    /// The wrapped engine, for operations beyond the [`Engine`] trait.
    pub fn core(&self) -> &EngineCore {
        &self.engine
    }

    /// Report an application lifecycle transition.
    ///
    /// Without an explicit hook, transitions before a successful `run` are
    /// only recorded.
    pub fn on_lifecycle(&self, phase: LifecyclePhase) {
        self.engine.telemetry().publish(EngineEvent::Lifecycle {
            phase,
            timestamp_ms: now_timestamp_ms(),
        });
        if let Some(hook) = self.lifecycle.get() {
            hook.on_transition(phase, &self.engine);
        }
    }
}

impl Engine for PlatformAdapter {
    fn run(
        &self,
        configuration: Configuration,
        log_level: LogLevel,
        on_running: Option<OnEngineRunning>,
    ) -> Result<(), EngineError> {
        self.engine.run(configuration, log_level, on_running)?;

        let flush_on_background = self
            .engine
            .config()
            .map(|config| config.stats.lifecycle_flushing)
            .unwrap_or(false);
        self.lifecycle.get_or_init(|| {
            if flush_on_background {
                Arc::new(FlushOnBackground)
            } else {
                Arc::new(DisabledLifecycleHook)
            }
        });
        Ok(())
    }

    fn start_stream(
        &self,
        callbacks: Arc<dyn StreamCallbacks>,
    ) -> Result<StreamHandle, EngineError> {
        self.engine.start_stream(callbacks)
    }

    fn record_counter(&self, name: &str, count: u64) -> Result<(), EngineError> {
        self.engine.record_counter(name, count)
    }
}

/// Step-by-step construction of a [`PlatformAdapter`].
pub struct PlatformAdapterBuilder {
    context: PlatformContext,
    loader: Box<dyn NativeLibraryLoader>,
    monitor: Option<Box<dyn NetworkMonitor>>,
    transport: Option<Arc<dyn TransportCore>>,
    lifecycle: Option<Arc<dyn LifecycleHook>>,
    library_gate: &'static ReadinessGate,
    monitor_gate: &'static ReadinessGate,
}

impl PlatformAdapterBuilder {
    fn new(context: PlatformContext) -> Self {
        Self {
            context,
            loader: default_library_loader(),
            monitor: default_network_monitor(),
            transport: None,
            lifecycle: None,
            library_gate: &NATIVE_LIBRARY,
            monitor_gate: &NETWORK_MONITOR,
        }
    }

    pub fn library_loader(mut self, loader: impl NativeLibraryLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn network_monitor(mut self, monitor: impl NetworkMonitor + 'static) -> Self {
        self.monitor = Some(Box::new(monitor));
        self
    }

    /// Skip the network monitor step, for platforms without one.
    pub fn without_network_monitor(mut self) -> Self {
        self.monitor = None;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn TransportCore>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Install `hook` instead of the one selected by `stats.lifecycle_flushing`.
    pub fn lifecycle_hook(mut self, hook: Arc<dyn LifecycleHook>) -> Self {
        self.lifecycle = Some(hook);
        self
    }

    /// Use gates other than the process-wide ones.
    pub fn readiness_gates(
        mut self,
        library: &'static ReadinessGate,
        monitor: &'static ReadinessGate,
    ) -> Self {
        self.library_gate = library;
        self.monitor_gate = monitor;
        self
    }

    pub fn build(self) -> Result<PlatformAdapter, EngineError> {
        let context = self.context;
        let loader = self.loader;

        self.library_gate
            .ensure(|| loader.load(&context))
            .map_err(|err| {
                log_platform_error(&err, "native library readiness");
                EngineError::from(err)
            })?;

        if let Some(monitor) = self.monitor {
            self.monitor_gate
                .ensure(|| monitor.ensure_active(&context))
                .map_err(|err| {
                    log_platform_error(&err, "network monitor readiness");
                    EngineError::from(err)
                })?;
        }

        let engine = match self.transport {
            Some(transport) => EngineCore::with_transport(transport),
            None => EngineCore::new(),
        };
        let lifecycle = OnceCell::new();
        if let Some(hook) = self.lifecycle {
            let _ = lifecycle.set(hook);
        }

        log::info!("[PlatformAdapter] Engine created for '{}'", context.app_id);
        Ok(PlatformAdapter {
            context,
            engine,
            lifecycle,
        })
    }
}
