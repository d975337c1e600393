//! Event accumulator – batches captured events before they hit the log
//! store.
//!
//! A flush happens when either threshold is crossed on `put`: the buffer
//! holds `max_events` events, or `max_age` has passed since the last flush.
//! Flushing is a whole-document read-modify-write against the store.
//!
//! The accumulator is not synchronised itself; [`crate::coordinator`] wraps
//! it in the one lock that also covers sequence assignment.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error};

use detritus_common::error::LogError;
use detritus_common::event::Event;
use detritus_common::session;
use detritus_common::store::LogStore;

/// Dual flush thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    pub max_events: usize,
    pub max_age: Duration,
}

impl FlushPolicy {
    /// Zero values are raised to the smallest meaningful threshold.
    pub fn new(max_events: usize, max_age: Duration) -> Self {
        FlushPolicy {
            max_events: max_events.max(1),
            max_age: max_age.max(Duration::from_millis(1)),
        }
    }
}

/// What `put` did with the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Held in memory; `pending` events are waiting for the next flush.
    Buffered { pending: usize },
    /// Persisted together with the rest of the buffer.
    Flushed { events: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub flushes: u64,
    pub flushed_events: u64,
}

pub struct Accumulator {
    store: Arc<dyn LogStore>,
    policy: FlushPolicy,
    buffer: Vec<Event>,
    last_flush: Instant,
    stats: FlushStats,
}

impl Accumulator {
    pub fn new(store: Arc<dyn LogStore>, policy: FlushPolicy) -> Self {
        Accumulator {
            store,
            policy,
            buffer: Vec::with_capacity(policy.max_events),
            last_flush: Instant::now(),
            stats: FlushStats::default(),
        }
    }

    /// Buffer `event` and flush if a threshold has been crossed.
    ///
    /// On a failed flush the event stays buffered together with everything
    /// before it and the error is returned; the next crossing retries.
    pub fn put(&mut self, event: Event) -> Result<PutOutcome, LogError> {
        self.buffer.push(event);

        if self.buffer.len() >= self.policy.max_events
            || self.last_flush.elapsed() >= self.policy.max_age
        {
            let events = self.flush()?;
            return Ok(PutOutcome::Flushed { events });
        }

        Ok(PutOutcome::Buffered {
            pending: self.buffer.len(),
        })
    }

    /// Append every buffered event to the stored document.
    ///
    /// Returns the number of events written.  The buffer and the flush
    /// timer are only touched after the write succeeded.
    pub fn flush(&mut self) -> Result<usize, LogError> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let written = self.write_buffer().inspect_err(|e| {
            error!("Flush of {} buffered event(s) failed: {e}", self.buffer.len());
        })?;

        self.buffer.clear();
        self.last_flush = Instant::now();
        self.stats.flushes += 1;
        self.stats.flushed_events += written as u64;
        debug!("Flushed {written} event(s) to {}", self.store.identifier());
        Ok(written)
    }

    fn write_buffer(&self) -> Result<usize, LogError> {
        let mut doc = session::load(self.store.as_ref())?;
        doc.events.extend(self.buffer.iter().cloned());
        session::save(self.store.as_ref(), &doc)?;
        Ok(self.buffer.len())
    }

    /// Drop buffered events and restart the flush timer.  The store is
    /// left alone.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last_flush = Instant::now();
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    #[cfg(test)]
    pub fn last_flush(&self) -> Instant {
        self.last_flush
    }

    pub fn stats(&self) -> FlushStats {
        self.stats
    }
}
