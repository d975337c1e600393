//! Captured request events.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One captured inbound request.  Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// 1-based position within the session.
    pub sequence: u64,
    #[serde(with = "crate::timestamp")]
    pub timestamp: DateTime<Local>,
    pub path: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: EventBody,
    pub query_params: Option<BTreeMap<String, String>>,
}

impl Event {
    /// Stamp a raw request with its sequence number and capture time.
    pub fn from_raw(sequence: u64, timestamp: DateTime<Local>, raw: RawRequest) -> Self {
        Event {
            sequence,
            timestamp,
            path: raw.path,
            method: raw.method,
            headers: raw.headers,
            body: raw.body,
            query_params: raw.query_params,
        }
    }
}

/// Request body: parsed JSON or raw text.
///
/// `Text` is tried first when reading, so a bare JSON string in a document
/// always comes back as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventBody {
    Text(String),
    Json(serde_json::Value),
}

impl EventBody {
    /// Classify a request payload.  Bodies declared as JSON that actually
    /// parse become `Json`; everything else is kept as lossy UTF-8 text.
    pub fn from_bytes(bytes: &[u8], is_json: bool) -> Self {
        if is_json {
            if let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) {
                return match value {
                    serde_json::Value::String(s) => EventBody::Text(s),
                    other => EventBody::Json(other),
                };
            }
        }
        EventBody::Text(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn is_json(&self) -> bool {
        matches!(self, EventBody::Json(_))
    }
}

impl Default for EventBody {
    fn default() -> Self {
        EventBody::Text(String::new())
    }
}

/// A request as handed over by the HTTP listener, before it is stamped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRequest {
    pub path: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: EventBody,
    pub query_params: Option<BTreeMap<String, String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Event {
        let raw = RawRequest {
            path: "/hooks/push".into(),
            method: "POST".into(),
            headers: BTreeMap::from([("x-token".to_string(), "abc".to_string())]),
            body: EventBody::Json(json!({"ref": "main"})),
            query_params: None,
        };
        Event::from_raw(1, crate::timestamp::parse("2025-09-22T10:11:12.5").unwrap(), raw)
    }

    #[test]
    fn test_event_json_shape() {
        let v = serde_json::to_value(sample()).unwrap();
        assert_eq!(v["sequence"], 1);
        assert_eq!(v["path"], "/hooks/push");
        assert_eq!(v["body"]["ref"], "main");
        assert!(v["query_params"].is_null());
        assert!(v["timestamp"].as_str().unwrap().starts_with("2025-09-22T10:11:12.500000"));
    }

    #[test]
    fn test_event_reads_legacy_document_entry() {
        let v = json!({
            "sequence": 4,
            "timestamp": "2025-09-22T10:11:12.123456",
            "path": "/x",
            "method": "POST",
            "headers": {"Host": "localhost:8000"},
            "body": "plain words",
            "query_params": {"a": "1"}
        });
        let e: Event = serde_json::from_value(v).unwrap();
        assert_eq!(e.sequence, 4);
        assert_eq!(e.body, EventBody::Text("plain words".into()));
        assert_eq!(e.query_params.unwrap()["a"], "1");
    }

    #[test]
    fn test_body_classification() {
        assert!(EventBody::from_bytes(br#"{"a":1}"#, true).is_json());
        assert!(EventBody::from_bytes(b"[1,2]", true).is_json());
        assert!(!EventBody::from_bytes(br#"{"a":1}"#, false).is_json());
        assert_eq!(
            EventBody::from_bytes(b"{broken", true),
            EventBody::Text("{broken".into())
        );
        assert_eq!(
            EventBody::from_bytes(br#""quoted""#, true),
            EventBody::Text("quoted".into())
        );
    }

    #[test]
    fn test_missing_timestamp_is_rejected() {
        let v = json!({
            "sequence": 1, "path": "/x", "method": "POST",
            "headers": {}, "body": "", "query_params": null
        });
        assert!(serde_json::from_value::<Event>(v).is_err());
    }
}
