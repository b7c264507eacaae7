//! Debug HTTP server surfaced only in `debug_http` feature builds.
//!
//! Spawns a lightweight Axum server exposing engine health, counters, and
//! an SSE stream of engine telemetry for diagnostics.

mod routes;
mod sse;

pub use routes::{build_router, run_http_server, DebugHttpState, HttpServerError};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use log::{error, info, warn};

use crate::engine::EngineCore;

static SERVER_STARTED: AtomicBool = AtomicBool::new(false);

/// Spawn the debug HTTP server on its own thread, once per process.
pub fn spawn(engine: &'static EngineCore) {
    if SERVER_STARTED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        warn!("[DebugHttp] Server already running");
        return;
    }

    let addr: SocketAddr = std::env::var("NETMUX_DEBUG_HTTP_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8788".to_string())
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8788)));

    let token = std::env::var("NETMUX_DEBUG_TOKEN").unwrap_or_else(|_| "netmux-debug".to_string());
    let preview = token.chars().take(4).collect::<String>();

    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                error!("[DebugHttp] Failed to build runtime: {}", err);
                SERVER_STARTED.store(false, Ordering::SeqCst);
                return;
            }
        };

        info!(
            "[DebugHttp] Binding {} (token prefix {}***)",
            addr, preview
        );

        runtime.block_on(async move {
            let state = DebugHttpState::new(engine, token);
            if let Err(err) = run_http_server(state, addr).await {
                error!("[DebugHttp] Server stopped: {:#}", err);
            }
        });
    });
}
