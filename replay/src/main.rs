//! Detritus Replay – re-sends a captured session to a target, preserving
//! the relative timing between events.

mod dispatch;
mod engine;
mod report;
mod schedule;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use detritus_common::config::Config;
use detritus_common::store;

use crate::dispatch::HttpDispatcher;
use crate::engine::ReplayEngine;

#[derive(Parser)]
#[command(name = "detritus-replay")]
#[command(version)]
#[command(about = "Replay captured HTTP requests, preserve relative timing")]
struct Args {
    /// Target base URL (default: REPLAY_TARGET_URL or http://localhost:3000)
    target_url: Option<String>,

    /// Capture file to replay (default: CAPTURE_PATH/CAPTURE_FILE if it
    /// exists, otherwise the newest capture in CAPTURE_PATH)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Speed multiplier (1.0 = real-time, 2.0 = 2x faster, 0.5 = half speed)
    #[arg(short, long)]
    speed: Option<f64>,

    /// Where to write the results (default: REPLAY_RESULTS_FILE or replay_results.json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, default_value = Config::default_path())]
    config: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config =
        detritus_common::config::load_or_default(&args.config).context("Config load failed")?;

    let file = match args.file {
        Some(file) => file,
        None => default_capture_file(&config)?,
    };
    let target = args.target_url.unwrap_or(config.replay_target_url);
    let speed = args.speed.unwrap_or(config.replay_speed);
    let output = args.output.unwrap_or(config.replay_results_file);

    // ── ctrl-c ───────────────────────────────────────────────────────
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_signal = cancel.clone();
    ctrlc::set_handler(move || {
        cancel_signal.store(true, Ordering::Relaxed);
        info!("Shutdown signal received, stopping after the current request");
    })
    .context("Cannot set Ctrl-C handler")?;

    // ── replay ───────────────────────────────────────────────────────
    let dispatcher = HttpDispatcher::new(config.replay_timeout)?;
    let engine = ReplayEngine::new(dispatcher).with_cancel(cancel);
    let report = engine
        .replay_file(&file, &target, speed)
        .with_context(|| format!("Replay of {} failed", file.display()))?;

    report.log_summary();
    report.write(&output)?;

    Ok(())
}

/// The configured capture file, or the newest one the capture server left
/// in `CAPTURE_PATH`.
fn default_capture_file(config: &Config) -> Result<PathBuf> {
    let configured = config.capture_file_path();
    if configured.is_file() {
        return Ok(configured);
    }
    let latest = store::latest_document(&config.capture_path)
        .with_context(|| format!("Cannot list {}", config.capture_path.display()))?
        .with_context(|| {
            format!(
                "No capture files in {}; pass one with --file",
                config.capture_path.display()
            )
        })?;
    info!("Replaying newest capture: {}", latest.display());
    Ok(latest)
}
