//! Replay engine – re-sends a captured session with its original timing.
//!
//! The whole schedule is anchored on a single monotonic start instant.
//! Each event waits until `offset - elapsed`, so time lost on one request
//! is absorbed by the next wait instead of accumulating.  Dispatch is
//! strictly sequential.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use detritus_common::error::LogError;
use detritus_common::event::Event;
use detritus_common::session::{self, SessionDocument};
use detritus_common::store::FileStore;
use detritus_common::timestamp;

use crate::dispatch::Dispatcher;
use crate::report::{EventOutcome, ReplayReport};
use crate::schedule;

/// Longest uninterrupted sleep while waiting for an event's slot.
const CANCEL_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("speed multiplier must be positive and keep every delay in range, got {0}")]
    InvalidSpeed(f64),

    #[error(transparent)]
    Session(#[from] LogError),
}

pub struct ReplayEngine<D> {
    dispatcher: D,
    cancel: Arc<AtomicBool>,
}

impl<D: Dispatcher> ReplayEngine<D> {
    pub fn new(dispatcher: D) -> Self {
        ReplayEngine {
            dispatcher,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop the replay when `cancel` becomes true.  Checked between events
    /// and while waiting; a request already in flight is allowed to finish.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Load a capture file and replay it.  A file that cannot be read or
    /// parsed aborts before anything is sent.
    pub fn replay_file(
        &self,
        path: &Path,
        target_base_url: &str,
        speed: f64,
    ) -> Result<ReplayReport, ReplayError> {
        let store = FileStore::from_path(path)
            .map_err(|e| LogError::store_io(path.display().to_string(), e))?;
        let doc = session::load(&store)?;
        self.replay(&doc, target_base_url, speed)
    }

    pub fn replay(
        &self,
        doc: &SessionDocument,
        target_base_url: &str,
        speed: f64,
    ) -> Result<ReplayReport, ReplayError> {
        if !schedule::valid_speed(speed) {
            return Err(ReplayError::InvalidSpeed(speed));
        }

        let mut report = ReplayReport {
            original_session: timestamp::format(&doc.session_start),
            replay_timestamp: String::new(),
            target_url: target_base_url.to_string(),
            speed_multiplier: speed,
            total_duration: 0.0,
            original_duration: 0.0,
            cancelled: false,
            results: Vec::with_capacity(doc.events.len()),
        };

        if doc.events.is_empty() {
            info!("No events to replay");
            report.replay_timestamp = timestamp::format(&timestamp::now());
            return Ok(report);
        }

        let delays = schedule::offsets(&doc.events, speed);
        if !schedule::representable(&delays) {
            return Err(ReplayError::InvalidSpeed(speed));
        }
        report.original_duration = delays.last().copied().unwrap_or_default();

        info!(
            "Replaying {} events from session started at {}",
            doc.events.len(),
            report.original_session
        );
        info!("Target: {target_base_url}");
        info!("Speed multiplier: {speed}x");
        info!("Timing preview:");
        for (i, (event, delay)) in doc.events.iter().zip(&delays).enumerate() {
            info!("  [{}] T+{delay:.3}s: {} {}", i + 1, event.method, event.path);
        }

        let replay_start = Instant::now();

        for (event, &scheduled) in doc.events.iter().zip(&delays) {
            if self.cancelled() {
                report.cancelled = true;
                break;
            }

            let wait = scheduled - replay_start.elapsed().as_secs_f64();
            if wait > 0.0 {
                info!(
                    "[{}] Waiting {wait:.3}s before replaying POST {}...",
                    event.sequence, event.path
                );
                let wait = Duration::try_from_secs_f64(wait).unwrap_or(Duration::MAX);
                if !self.sleep(wait) {
                    report.cancelled = true;
                    break;
                }
            } else {
                info!(
                    "[{}] Replaying POST {} (running {:.3}s behind schedule)...",
                    event.sequence, event.path, -wait
                );
            }

            let actual = replay_start.elapsed().as_secs_f64();
            report
                .results
                .push(self.dispatch_one(event, target_base_url, scheduled, actual));
        }

        if report.cancelled {
            warn!(
                "Replay cancelled after {} of {} events",
                report.results.len(),
                doc.events.len()
            );
        }

        report.total_duration = replay_start.elapsed().as_secs_f64();
        report.replay_timestamp = timestamp::format(&timestamp::now());
        Ok(report)
    }

    fn dispatch_one(
        &self,
        event: &Event,
        target_base_url: &str,
        scheduled: f64,
        actual: f64,
    ) -> EventOutcome {
        let url = target_url(target_base_url, &event.path);
        let started = Instant::now();
        let result = self.dispatcher.dispatch(&url, event);
        let request_duration = started.elapsed().as_secs_f64();
        let drift = actual - scheduled;

        let mut outcome = EventOutcome {
            sequence: event.sequence,
            path: event.path.clone(),
            status_code: None,
            success: false,
            scheduled_time: scheduled,
            actual_time: actual,
            timing_drift: drift,
            request_duration: Some(request_duration),
            response: None,
            error: None,
        };

        match result {
            Ok(resp) => {
                outcome.success = resp.status < 400;
                outcome.status_code = Some(resp.status);
                outcome.response = Some(resp.body);
                let mark = if outcome.success { "ok" } else { "FAILED" };
                info!(
                    "  {mark} Status: {} (took {request_duration:.3}s, drift: {drift:+.3}s)",
                    resp.status
                );
            }
            Err(e) => {
                warn!("  FAILED Error: {e}");
                outcome.error = Some(e.to_string());
            }
        }
        outcome
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Sleep in short slices so cancellation is noticed.  Returns `false`
    /// if cancelled before the full duration passed.
    fn sleep(&self, duration: Duration) -> bool {
        // No deadline means it lies past what `Instant` can express.
        let deadline = Instant::now().checked_add(duration);
        loop {
            if self.cancelled() {
                return false;
            }
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return true;
                    }
                    (deadline - now).min(CANCEL_POLL)
                }
                None => CANCEL_POLL,
            };
            std::thread::sleep(slice);
        }
    }
}

/// `base + path`, without doubling the slash between them.
pub fn target_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
