// netmux - client-side network engine facade
// One engine per process, many multiplexed streams, best-effort counters

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod platform;
pub mod stats;
pub mod stream;
pub mod telemetry;

#[cfg(feature = "debug_http")]
pub mod http;

pub use config::{Configuration, EngineConfig, LogLevel};
pub use engine::{Engine, EngineCore, OnEngineRunning};
pub use error::{EngineError, ErrorCode, PlatformError, StreamError, StreamErrorKind};
pub use platform::{PlatformAdapter, PlatformContext};
pub use stream::{Headers, StreamCallbacks, StreamEvent, StreamEvents, StreamHandle, StreamId};

use once_cell::sync::OnceCell;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, Registry};

static LOG_FILTER: OnceCell<reload::Handle<LevelFilter, Registry>> = OnceCell::new();

/// Install the process-wide log subscriber, or retune it if already installed.
///
/// Never panics. If the host process installed its own global subscriber,
/// records go there and `level` only adjusts the `log` facade.
pub fn init_logging(level: LogLevel) {
    let filter = level.to_level_filter();
    if let Ok(handle) = LOG_FILTER.get_or_try_init(|| install_subscriber(filter)) {
        let _ = handle.modify(|current| *current = filter);
    }
    log::set_max_level(level.to_log_filter());
}

#[cfg(not(target_os = "android"))]
fn install_subscriber(filter: LevelFilter) -> Result<reload::Handle<LevelFilter, Registry>, ()> {
    let (filter_layer, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|_| ())?;
    Ok(handle)
}

#[cfg(target_os = "android")]
fn install_subscriber(filter: LevelFilter) -> Result<reload::Handle<LevelFilter, Registry>, ()> {
    let logcat = tracing_android::layer("netmux").map_err(|_| ())?;
    let (filter_layer, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(logcat)
        .try_init()
        .map_err(|_| ())?;
    Ok(handle)
}

/// JNI_OnLoad is called when the native library is loaded by Android.
/// Installs logcat logging and captures the JavaVM for the platform layer.
#[cfg(target_os = "android")]
#[no_mangle]
pub extern "system" fn JNI_OnLoad(
    vm: jni::JavaVM,
    _reserved: *mut std::ffi::c_void,
) -> jni::sys::jint {
    init_logging(LogLevel::Info);

    log::info!("JNI_OnLoad called - initializing Android context");

    // SAFETY: the JavaVM pointer is valid for the life of the process. No
    // application context is available yet, so a null context is recorded.
    unsafe {
        ndk_context::initialize_android_context(
            vm.get_java_vm_pointer().cast(),
            std::ptr::null_mut(),
        );
    }
    platform::mark_native_library_loaded();

    log::info!("Android context initialized successfully");

    jni::sys::JNI_VERSION_1_6
}
