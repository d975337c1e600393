//! Detritus Capture Server – records inbound POST requests into a session
//! document.
//!
//! This binary:
//! 1. Reads configuration from `.env` (or the path given as first argument)
//! 2. Starts a fresh capture session in `CAPTURE_PATH`
//! 3. Runs an axum HTTP server that captures every POST it receives
//! 4. Flushes buffered events on Ctrl-C before exiting

mod accumulator;
mod coordinator;
mod server;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use detritus_common::store::FileStore;

use crate::accumulator::FlushPolicy;
use crate::coordinator::CaptureCoordinator;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── load config ──────────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| detritus_common::config::Config::default_path().to_string());
    let config = detritus_common::config::load_or_default(&PathBuf::from(&config_path))
        .context("Config load failed")?;

    info!(
        "Detritus Capture Server starting (listen={})",
        config.capture_listen_addr
    );

    // ── open session ─────────────────────────────────────────────────
    let store = FileStore::new(&config.capture_path, config.capture_file.clone())
        .context("Cannot create capture directory")?;
    let policy = FlushPolicy::new(config.flush_max_events, config.flush_max_age);
    let coordinator = Arc::new(
        CaptureCoordinator::new(Arc::new(store.clone()), policy)
            .context("Cannot initialise capture file")?,
    );
    info!(
        "Events will be saved to: {store} (flush every {} event(s) or {:.1}s)",
        policy.max_events,
        policy.max_age.as_secs_f64()
    );
    info!("Endpoints:");
    info!("  - POST /<any-path>     : Capture request");
    info!("  - GET /capture/status  : View capture status");
    info!("  - POST /capture/reset  : Clear all captures");

    // ── ctrl-c ───────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_signal = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_signal.store(true, Ordering::Relaxed);
        info!("Shutdown signal received");
    })
    .context("Cannot set Ctrl-C handler")?;

    // ── start HTTP server ────────────────────────────────────────────
    let listen_addr = config.capture_listen_addr.clone();
    let server_coordinator = coordinator.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::run(server_coordinator, &listen_addr, shutdown).await {
            tracing::error!("HTTP server error: {e:#}");
        }
    });

    // Wait for the server task (runs until shutdown)
    let _ = server_handle.await;

    // Persist whatever is still buffered
    let flushed = tokio::task::spawn_blocking(move || coordinator.flush())
        .await
        .context("Final flush task failed")?
        .context("Final flush failed")?;
    info!("Flushed {flushed} pending event(s) on shutdown");

    info!("Detritus Capture Server stopped");
    Ok(())
}
