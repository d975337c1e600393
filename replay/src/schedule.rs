//! Replay schedule – offsets of every event relative to the first one.

use std::time::Duration;

use detritus_common::event::Event;

/// Seconds between `event` and `first`, divided by `speed`.
///
/// Computed against the first event rather than the previous one, so a
/// slow dispatch never pushes later events back.  Logs that are out of
/// timestamp order produce negative offsets, which simply dispatch at once.
pub fn offsets(events: &[Event], speed: f64) -> Vec<f64> {
    let Some(first) = events.first() else {
        return Vec::new();
    };
    events
        .iter()
        .map(|e| seconds(e.timestamp - first.timestamp) / speed)
        .collect()
}

fn seconds(d: chrono::Duration) -> f64 {
    match d.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => d.num_milliseconds() as f64 / 1000.0,
    }
}

/// Every offset is finite and fits in a [`Duration`].  A tiny speed
/// multiplier can stretch the schedule past that.
pub fn representable(offsets: &[f64]) -> bool {
    offsets
        .iter()
        .all(|o| Duration::try_from_secs_f64(o.abs()).is_ok())
}

/// A usable speed multiplier is finite and strictly positive.
pub fn valid_speed(speed: f64) -> bool {
    speed.is_finite() && speed > 0.0
}
