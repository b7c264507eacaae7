use std::net::UdpSocket;

use crate::error::PlatformError;

use super::{NativeLibraryLoader, NetworkMonitor, PlatformContext};

/// Desktop builds link the engine statically; only an explicit library
/// path is checked.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopLibraryLoader;

impl NativeLibraryLoader for DesktopLibraryLoader {
    fn load(&self, context: &PlatformContext) -> Result<(), PlatformError> {
        match &context.library_path {
            Some(path) if !path.exists() => Err(PlatformError::NativeLibraryUnavailable {
                reason: format!("{} does not exist", path.display()),
            }),
            Some(path) => {
                log::debug!("[Platform] Using native library at {}", path.display());
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Treats the network stack as available once a local UDP socket binds.
#[derive(Debug, Default, Clone, Copy)]
pub struct SocketProbeMonitor;

impl NetworkMonitor for SocketProbeMonitor {
    fn ensure_active(&self, context: &PlatformContext) -> Result<(), PlatformError> {
        let socket = UdpSocket::bind(("127.0.0.1", 0)).map_err(|err| {
            PlatformError::NetworkMonitorUnavailable {
                reason: format!("socket probe failed: {}", err),
            }
        })?;
        log::debug!(
            "[Platform] Network probe for '{}' bound {:?}",
            context.app_id,
            socket.local_addr().ok()
        );
        Ok(())
    }
}
