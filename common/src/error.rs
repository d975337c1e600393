//! Error types for the durable event log.

/// Failures reading or writing a session document.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The underlying store could not be read or written.
    #[error("store I/O failed for {store}: {source}")]
    StoreIo {
        store: String,
        #[source]
        source: std::io::Error,
    },

    /// The persisted document is not a valid session.
    #[error("malformed session document {store}: {reason}")]
    MalformedSession { store: String, reason: String },

    #[error("cannot serialize session document: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl LogError {
    pub fn store_io(store: impl Into<String>, source: std::io::Error) -> Self {
        LogError::StoreIo {
            store: store.into(),
            source,
        }
    }

    pub fn malformed(store: impl Into<String>, reason: impl Into<String>) -> Self {
        LogError::MalformedSession {
            store: store.into(),
            reason: reason.into(),
        }
    }
}
