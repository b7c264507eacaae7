//! Platform preconditions and the adapter that composes them with the engine.
//!
//! Before an [`EngineCore`](crate::engine::EngineCore) may exist, the native
//! library must be loaded and (on platforms that have one) the network
//! monitor must be active. Both are process-wide, one-time steps guarded by
//! [`ReadinessGate`]s.

use std::path::PathBuf;

use once_cell::sync::OnceCell;

use crate::error::PlatformError;

mod adapter;

cfg_if::cfg_if! {
    if #[cfg(target_os = "android")] {
        mod android;
        pub use android::{mark_native_library_loaded, AndroidLibraryLoader, AndroidNetworkMonitor};
    } else {
        mod desktop;
        pub use desktop::{DesktopLibraryLoader, SocketProbeMonitor};
    }
}

pub use adapter::{PlatformAdapter, PlatformAdapterBuilder};

/// Host-supplied description of the platform the engine runs on.
#[derive(Debug, Clone, Default)]
pub struct PlatformContext {
    /// Identifier of the embedding application, used in logs
    pub app_id: String,
    /// Location of the native library when it is loaded from disk
    pub library_path: Option<PathBuf>,
}

impl PlatformContext {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            library_path: None,
        }
    }

    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }
}

/// Makes the native engine library available to the process.
pub trait NativeLibraryLoader: Send + Sync {
    fn load(&self, context: &PlatformContext) -> Result<(), PlatformError>;
}

/// Brings up OS-level network reachability monitoring.
pub trait NetworkMonitor: Send + Sync {
    fn ensure_active(&self, context: &PlatformContext) -> Result<(), PlatformError>;
}

/// One-time, process-wide precondition.
///
/// The first successful initialization is remembered; a failed one is not,
/// so a later caller may retry.
pub struct ReadinessGate {
    name: &'static str,
    ready: OnceCell<()>,
}

impl ReadinessGate {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            ready: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_ready(&self) -> bool {
        self.ready.get().is_some()
    }

    /// Run `init` unless the gate is already open.
    ///
    /// Concurrent callers block until the running initialization finishes.
    pub fn ensure<F>(&self, init: F) -> Result<(), PlatformError>
    where
        F: FnOnce() -> Result<(), PlatformError>,
    {
        self.ready
            .get_or_try_init(|| {
                init()?;
                log::info!("[Platform] {} ready", self.name);
                Ok(())
            })
            .map(|_| ())
    }
}

/// Process-wide gate for the native library.
pub static NATIVE_LIBRARY: ReadinessGate = ReadinessGate::new("native library");

/// Process-wide gate for the network monitor.
pub static NETWORK_MONITOR: ReadinessGate = ReadinessGate::new("network monitor");

/// Loader for the current target.
pub fn default_library_loader() -> Box<dyn NativeLibraryLoader> {
    #[cfg(target_os = "android")]
    {
        Box::new(AndroidLibraryLoader)
    }

    #[cfg(not(target_os = "android"))]
    {
        Box::new(DesktopLibraryLoader)
    }
}

/// Network monitor for the current target.
pub fn default_network_monitor() -> Option<Box<dyn NetworkMonitor>> {
    #[cfg(target_os = "android")]
    {
        Some(Box::new(AndroidNetworkMonitor))
    }

    #[cfg(not(target_os = "android"))]
    {
        Some(Box::new(SocketProbeMonitor))
    }
}

#[cfg(test)]
mod tests;
