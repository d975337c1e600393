//! Outbound HTTP for replayed events.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use tracing::warn;

use detritus_common::event::{Event, EventBody};

/// Captured headers that are not forwarded; the client recomputes them.
const DROPPED_HEADERS: [&str; 3] = ["host", "content-length", "content-type"];

/// Longest text response kept in the report.
const RESPONSE_PREVIEW_CHARS: usize = 200;

/// What came back from the target.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResponse {
    pub status: u16,
    /// JSON body if it parsed, otherwise the start of the text.
    pub body: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),
}

/// Sends one event to the target.
pub trait Dispatcher {
    fn dispatch(&self, url: &str, event: &Event) -> Result<DispatchResponse, DispatchError>;
}

/// Blocking reqwest client with a fixed per-request timeout.
pub struct HttpDispatcher {
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl HttpDispatcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Cannot create HTTP client")?;
        Ok(HttpDispatcher { client, timeout })
    }
}

impl Dispatcher for HttpDispatcher {
    fn dispatch(&self, url: &str, event: &Event) -> Result<DispatchResponse, DispatchError> {
        let request = self.client.post(url).headers(forward_headers(event));
        let request = match &event.body {
            EventBody::Json(value) => request.json(value),
            EventBody::Text(text) => request
                .header(CONTENT_TYPE, "text/plain")
                .body(text.clone()),
        };

        let resp = request.send().map_err(|e| self.classify(e))?;
        let status = resp.status().as_u16();
        let text = resp.text().map_err(|e| self.classify(e))?;

        Ok(DispatchResponse {
            status,
            body: response_body(&text),
        })
    }
}

impl HttpDispatcher {
    fn classify(&self, e: reqwest::Error) -> DispatchError {
        if e.is_timeout() {
            DispatchError::Timeout(self.timeout)
        } else if e.is_connect() {
            DispatchError::Connect(e.to_string())
        } else {
            DispatchError::Request(e.to_string())
        }
    }
}

/// Captured headers minus `host`, `content-length` and `content-type`.
/// Headers that are not valid on the wire are skipped.
pub fn forward_headers(event: &Event) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in &event.headers {
        if DROPPED_HEADERS.iter().any(|d| name.eq_ignore_ascii_case(d)) {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(n), Ok(v)) => {
                headers.append(n, v);
            }
            _ => warn!("[{}] Skipping unforwardable header {name:?}", event.sequence),
        }
    }
    headers
}

/// Parse as JSON, or keep the first characters of the text.
pub fn response_body(text: &str) -> serde_json::Value {
    serde_json::from_str(text).unwrap_or_else(|_| {
        serde_json::Value::String(text.chars().take(RESPONSE_PREVIEW_CHARS).collect())
    })
}
