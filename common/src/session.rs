//! Session documents: `{ "session_start": ..., "events": [...] }`.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::LogError;
use crate::event::Event;
use crate::store::LogStore;

/// One capture run as persisted in the log store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    #[serde(with = "crate::timestamp")]
    pub session_start: DateTime<Local>,
    pub events: Vec<Event>,
}

impl SessionDocument {
    pub fn new(session_start: DateTime<Local>) -> Self {
        SessionDocument {
            session_start,
            events: Vec::new(),
        }
    }

    /// An empty session starting now.
    pub fn fresh() -> Self {
        SessionDocument::new(crate::timestamp::now())
    }
}

/// Parse a session document.  `store` only labels errors.
pub fn parse(text: &str, store: &str) -> Result<SessionDocument, LogError> {
    serde_json::from_str(text).map_err(|e| LogError::malformed(store, e.to_string()))
}

/// Read and parse the whole document held by `store`.
pub fn load(store: &dyn LogStore) -> Result<SessionDocument, LogError> {
    let id = store.identifier();
    let text = store.read().map_err(|e| LogError::store_io(&id, e))?;
    parse(&text, &id)
}

/// Replace the document held by `store`.
pub fn save(store: &dyn LogStore, doc: &SessionDocument) -> Result<(), LogError> {
    let text = serde_json::to_string_pretty(doc)?;
    store
        .write(&text)
        .map_err(|e| LogError::store_io(store.identifier(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventBody, RawRequest};
    use crate::store::FileStore;

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), "session.json").unwrap();

        let mut doc = SessionDocument::fresh();
        doc.events.push(Event::from_raw(
            1,
            crate::timestamp::now(),
            RawRequest {
                path: "/a".into(),
                method: "POST".into(),
                body: EventBody::Text("hi".into()),
                ..Default::default()
            },
        ));
        save(&store, &doc).unwrap();

        let loaded = load(&store).unwrap();
        assert_eq!(loaded, doc);
        // written with two-space indentation
        assert!(store.read().unwrap().contains("\n  \"events\""));
    }

    #[test]
    fn test_missing_document_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), "nope.json").unwrap();
        assert!(matches!(load(&store), Err(LogError::StoreIo { .. })));
    }

    #[test]
    fn test_missing_events_key_is_malformed() {
        let err = parse(r#"{"session_start": "2025-09-22T10:00:00"}"#, "mem").unwrap_err();
        assert!(matches!(err, LogError::MalformedSession { .. }));
        assert!(err.to_string().contains("events"));
    }

    #[test]
    fn test_not_json_is_malformed() {
        assert!(matches!(
            parse("{{{", "mem"),
            Err(LogError::MalformedSession { .. })
        ));
    }
}
