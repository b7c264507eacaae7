use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::PlatformError;

use super::{NativeLibraryLoader, NetworkMonitor, PlatformContext};

static NATIVE_LIBRARY_LOADED: AtomicBool = AtomicBool::new(false);

/// Record that `JNI_OnLoad` ran and the Android context is initialized.
pub fn mark_native_library_loaded() {
    NATIVE_LIBRARY_LOADED.store(true, Ordering::SeqCst);
}

/// On Android the library is loaded by the JVM; readiness means
/// `JNI_OnLoad` has already run.
#[derive(Debug, Default, Clone, Copy)]
pub struct AndroidLibraryLoader;

impl NativeLibraryLoader for AndroidLibraryLoader {
    fn load(&self, _context: &PlatformContext) -> Result<(), PlatformError> {
        if NATIVE_LIBRARY_LOADED.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PlatformError::NativeLibraryUnavailable {
                reason: "JNI_OnLoad has not run".to_string(),
            })
        }
    }
}

/// Requires an attached JavaVM, through which connectivity callbacks arrive.
#[derive(Debug, Default, Clone, Copy)]
pub struct AndroidNetworkMonitor;

impl NetworkMonitor for AndroidNetworkMonitor {
    fn ensure_active(&self, context: &PlatformContext) -> Result<(), PlatformError> {
        if !NATIVE_LIBRARY_LOADED.load(Ordering::SeqCst) {
            return Err(PlatformError::ContextMissing);
        }
        let android = ndk_context::android_context();
        if android.vm().is_null() {
            return Err(PlatformError::NetworkMonitorUnavailable {
                reason: "JavaVM is not attached".to_string(),
            });
        }
        log::info!("[Platform] Network monitor active for '{}'", context.app_id);
        Ok(())
    }
}
