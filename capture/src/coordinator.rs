//! Capture coordinator – numbers and timestamps incoming requests and
//! feeds them to the accumulator.
//!
//! Sequence assignment, counter updates, buffering and flushing all happen
//! under one mutex.  Sequence numbers therefore follow the order in which
//! captures acquired that lock, which under load can differ from the order
//! requests reached the socket.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use detritus_common::error::LogError;
use detritus_common::event::{Event, RawRequest};
use detritus_common::session::{self, SessionDocument};
use detritus_common::store::LogStore;
use detritus_common::timestamp;

use crate::accumulator::{Accumulator, FlushPolicy, FlushStats, PutOutcome};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The event was numbered and is still buffered, but the flush it
    /// triggered failed.  It will be retried with the next flush.
    #[error("event {sequence} buffered but not persisted: {source}")]
    NotDurable {
        sequence: u64,
        #[source]
        source: LogError,
    },

    #[error(transparent)]
    Store(#[from] LogError),

    #[error("capture state lock poisoned")]
    Poisoned,
}

/// Read-only snapshot for `/capture/status`.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureStatus {
    pub total_events: u64,
    pub json_file: String,
    pub session_start: DateTime<Local>,
    pub pending: usize,
    pub flush_stats: FlushStats,
}

struct CaptureState {
    accumulator: Accumulator,
    total_events: u64,
    session_start: DateTime<Local>,
}

pub struct CaptureCoordinator {
    store: Arc<dyn LogStore>,
    state: Mutex<CaptureState>,
}

impl CaptureCoordinator {
    /// Start a new session, overwriting whatever the store held.
    pub fn new(store: Arc<dyn LogStore>, policy: FlushPolicy) -> Result<Self, LogError> {
        let doc = SessionDocument::fresh();
        session::save(store.as_ref(), &doc)?;
        info!(
            "Capture session started at {} ({})",
            timestamp::format(&doc.session_start),
            store.identifier()
        );

        Ok(CaptureCoordinator {
            state: Mutex::new(CaptureState {
                accumulator: Accumulator::new(store.clone(), policy),
                total_events: 0,
                session_start: doc.session_start,
            }),
            store,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, CaptureState>, CaptureError> {
        self.state.lock().map_err(|_| CaptureError::Poisoned)
    }

    /// Stamp `raw` and hand it to the accumulator.  Returns the sequence
    /// number assigned to the event.
    pub fn capture(&self, raw: RawRequest) -> Result<u64, CaptureError> {
        let mut state = self.lock()?;

        let sequence = state.total_events + 1;
        let event = Event::from_raw(sequence, timestamp::now(), raw);
        let result = state.accumulator.put(event);

        // The event is in the buffer whether or not the flush worked, so its
        // number is spent either way.
        state.total_events = sequence;

        match result {
            Ok(PutOutcome::Flushed { events }) => {
                info!("Flushed {events} event(s) with capture {sequence}");
                Ok(sequence)
            }
            Ok(PutOutcome::Buffered { pending }) => {
                debug!("[{sequence}] Buffered ({pending} pending)");
                Ok(sequence)
            }
            Err(source) => Err(CaptureError::NotDurable { sequence, source }),
        }
    }

    pub fn status(&self) -> Result<CaptureStatus, CaptureError> {
        let state = self.lock()?;
        Ok(CaptureStatus {
            total_events: state.total_events,
            json_file: self.store.identifier(),
            session_start: state.session_start,
            pending: state.accumulator.pending(),
            flush_stats: state.accumulator.stats(),
        })
    }

    /// Begin a new session: fresh start time, numbering from 1, empty
    /// buffer and an empty document in the store.
    pub fn reset(&self) -> Result<(), CaptureError> {
        let mut state = self.lock()?;

        let dropped = state.accumulator.pending();
        if dropped > 0 {
            warn!("Reset discards {dropped} unflushed event(s)");
        }

        let mut start = timestamp::now();
        if start <= state.session_start {
            start = state.session_start + chrono::Duration::microseconds(1);
        }

        session::save(self.store.as_ref(), &SessionDocument::new(start))?;
        state.accumulator.reset();
        state.total_events = 0;
        state.session_start = start;

        info!("Capture file reset, session start {}", timestamp::format(&start));
        Ok(())
    }

    /// Persist anything still buffered.
    pub fn flush(&self) -> Result<usize, CaptureError> {
        let mut state = self.lock()?;
        Ok(state.accumulator.flush()?)
    }
}
