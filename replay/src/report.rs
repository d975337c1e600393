//! Replay results: per-event outcomes, the run summary and the results
//! file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Outcome of replaying one event.  Times are seconds from replay start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventOutcome {
    pub sequence: u64,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub success: bool,
    pub scheduled_time: f64,
    pub actual_time: f64,
    pub timing_drift: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything a replay run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    /// Start of the replayed capture session (ISO-8601).
    pub original_session: String,
    /// When this replay ran (ISO-8601).
    pub replay_timestamp: String,
    pub target_url: String,
    pub speed_multiplier: f64,
    /// Wall-clock seconds the replay took.
    pub total_duration: f64,
    /// Scheduled offset of the last event.
    pub original_duration: f64,
    /// Stopped early on request.
    pub cancelled: bool,
    pub results: Vec<EventOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub original_duration: f64,
    pub mean_abs_drift: f64,
    pub cancelled: bool,
}

/// On-disk layout of the results file.
#[derive(Serialize)]
struct ReportDocument<'a> {
    original_session: &'a str,
    replay_timestamp: &'a str,
    target_url: &'a str,
    speed_multiplier: f64,
    total_duration: f64,
    summary: Summary,
    results: &'a [EventOutcome],
}

impl ReplayReport {
    pub fn successful(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.successful()
    }

    /// Mean of `|timing_drift|`; zero for an empty run.
    pub fn mean_abs_drift(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        self.results.iter().map(|r| r.timing_drift.abs()).sum::<f64>() / self.results.len() as f64
    }

    pub fn summary(&self) -> Summary {
        Summary {
            total: self.results.len(),
            successful: self.successful(),
            failed: self.failed(),
            original_duration: self.original_duration,
            mean_abs_drift: self.mean_abs_drift(),
            cancelled: self.cancelled,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&ReportDocument {
            original_session: &self.original_session,
            replay_timestamp: &self.replay_timestamp,
            target_url: &self.target_url,
            speed_multiplier: self.speed_multiplier,
            total_duration: self.total_duration,
            summary: self.summary(),
            results: &self.results,
        })
    }

    /// Write the results file.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = self.to_json().context("Cannot serialize replay report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Cannot write results: {}", path.display()))?;
        info!("Results saved to: {}", path.display());
        Ok(())
    }

    pub fn log_summary(&self) {
        info!("Summary:");
        info!("  Total events: {}", self.results.len());
        info!("  Successful: {}", self.successful());
        info!("  Failed: {}", self.failed());
        info!("  Total duration: {:.3}s", self.total_duration);
        info!("  Original duration: {:.3}s", self.original_duration);
        info!("  Average timing drift: {:.3}s", self.mean_abs_drift());
        if self.cancelled {
            info!("  Replay was cancelled before the last event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(sequence: u64, success: bool, drift: f64) -> EventOutcome {
        EventOutcome {
            sequence,
            path: format!("/p/{sequence}"),
            status_code: success.then_some(200),
            success,
            scheduled_time: sequence as f64,
            actual_time: sequence as f64 + drift,
            timing_drift: drift,
            request_duration: Some(0.01),
            response: None,
            error: (!success).then(|| "connection refused".to_string()),
        }
    }

    fn report(results: Vec<EventOutcome>) -> ReplayReport {
        ReplayReport {
            original_session: "2025-09-23T12:00:00.000000+00:00".into(),
            replay_timestamp: "2025-09-24T08:00:00.000000+00:00".into(),
            target_url: "http://localhost:3001".into(),
            speed_multiplier: 2.0,
            total_duration: 3.1,
            original_duration: 3.0,
            cancelled: false,
            results,
        }
    }

    #[test]
    fn test_summary_counts_and_drift() {
        let r = report(vec![
            outcome(1, true, 0.002),
            outcome(2, false, -0.004),
            outcome(3, true, 0.012),
        ]);
        let s = r.summary();
        assert_eq!(s.total, 3);
        assert_eq!(s.successful, 2);
        assert_eq!(s.failed, 1);
        assert!((s.mean_abs_drift - 0.006).abs() < 1e-12);
    }

    #[test]
    fn test_empty_report() {
        let r = report(vec![]);
        assert_eq!(r.mean_abs_drift(), 0.0);
        assert_eq!(r.failed(), 0);
    }

    #[test]
    fn test_document_layout() {
        let r = report(vec![outcome(1, true, 0.0), outcome(2, false, 0.1)]);
        let v: serde_json::Value = serde_json::from_str(&r.to_json().unwrap()).unwrap();
        assert_eq!(v["target_url"], "http://localhost:3001");
        assert_eq!(v["speed_multiplier"], 2.0);
        assert_eq!(v["summary"]["failed"], 1);
        assert_eq!(v["results"][0]["status_code"], 200);
        assert!(v["results"][0].get("error").is_none());
        assert_eq!(v["results"][1]["error"], "connection refused");
        assert!(v["results"][1].get("status_code").is_none());
    }

    #[test]
    fn test_write_results_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay_results.json");
        report(vec![outcome(1, true, 0.0)]).write(&path).unwrap();
        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["results"].as_array().unwrap().len(), 1);
    }
}
