//! Shared HTTP protocol types for the capture server.

use serde::{Deserialize, Serialize};

/// Reply to a captured request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedResponse {
    pub status: String,
    pub sequence: u64,
}

/// Reply to a capture that could not be persisted.
///
/// `sequence` is set when the event was numbered and is still buffered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureErrorResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    pub message: String,
}

/// `GET /capture/status` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub total_events: u64,
    /// Identifier of the session document in the store.
    pub json_file: String,
    /// ISO-8601 session start.
    pub session_start: String,
}

/// `POST /capture/reset` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub status: String,
    pub message: String,
}

/// Health-check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
}
