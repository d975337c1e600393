//! Configuration parsing – reads a KEY=VALUE file (`.env` style).
//!
//! Both binaries load the same file; each ignores fields it does not need.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

/// Application configuration, shared between the capture server and the
/// replay tool.
#[derive(Debug, Clone)]
pub struct Config {
    // ── capture ──────────────────────────────────────────────────────
    /// Directory holding session documents.
    pub capture_path: PathBuf,
    /// Session document name.  Defaults to the process start time.
    pub capture_file: String,
    pub capture_listen_addr: String,

    // ── accumulator ──────────────────────────────────────────────────
    /// Flush once this many events are buffered.
    pub flush_max_events: usize,
    /// Flush once this long has passed since the previous flush.
    pub flush_max_age: Duration,

    // ── replay ───────────────────────────────────────────────────────
    pub replay_target_url: String,
    pub replay_speed: f64,
    pub replay_timeout: Duration,
    pub replay_results_file: PathBuf,
}

impl Config {
    /// Default config path.
    pub fn default_path() -> &'static str {
        ".env"
    }

    /// Full path of the session document.
    pub fn capture_file_path(&self) -> PathBuf {
        self.capture_path.join(&self.capture_file)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            capture_path: PathBuf::from("events/"),
            capture_file: chrono::Local::now().format("%Y%m%d_%H%M%S.json").to_string(),
            capture_listen_addr: "0.0.0.0:8000".into(),
            flush_max_events: 10,
            flush_max_age: Duration::from_secs(2),
            replay_target_url: "http://localhost:3000".into(),
            replay_speed: 1.0,
            replay_timeout: Duration::from_secs(10),
            replay_results_file: PathBuf::from("replay_results.json"),
        }
    }
}

/// Parse a `KEY=VALUE` configuration file.
///
/// Lines starting with `#` are comments.  Values may be optionally
/// double-quoted.  Unknown keys are silently ignored.
pub fn load(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read config: {}", path.display()))?;

    let map = parse_conf(&text);
    info!("Loaded config from {}", path.display());
    from_map(&map).with_context(|| format!("Invalid config: {}", path.display()))
}

/// Like [`load`], but a missing file means "all defaults".
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load(path)
    } else {
        info!("No config at {}, using defaults", path.display());
        Ok(Config::default())
    }
}

fn from_map(map: &HashMap<String, String>) -> Result<Config> {
    let defaults = Config::default();
    let get = |key: &str| -> Option<String> { map.get(key).cloned().filter(|v| !v.is_empty()) };
    let get_secs = |key: &str, default: Duration| -> Result<Duration> {
        let Some(v) = get(key) else {
            return Ok(default);
        };
        let secs: f64 = v
            .parse()
            .with_context(|| format!("{key}={v} is not a number"))?;
        if !(secs.is_finite() && secs > 0.0) {
            anyhow::bail!("{key} must be a positive number of seconds");
        }
        Ok(Duration::from_secs_f64(secs))
    };

    let flush_max_events = match get("FLUSH_MAX_EVENTS") {
        Some(v) => v
            .parse::<usize>()
            .with_context(|| format!("FLUSH_MAX_EVENTS={v} is not a count"))?,
        None => defaults.flush_max_events,
    };
    if flush_max_events == 0 {
        anyhow::bail!("FLUSH_MAX_EVENTS must be greater than zero");
    }

    let replay_speed = match get("REPLAY_SPEED") {
        Some(v) => v
            .parse::<f64>()
            .with_context(|| format!("REPLAY_SPEED={v} is not a number"))?,
        None => defaults.replay_speed,
    };

    Ok(Config {
        capture_path: get("CAPTURE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.capture_path),
        capture_file: get("CAPTURE_FILE").unwrap_or(defaults.capture_file),
        capture_listen_addr: get("CAPTURE_LISTEN_ADDR").unwrap_or(defaults.capture_listen_addr),

        flush_max_events,
        flush_max_age: get_secs("FLUSH_MAX_AGE_SECS", defaults.flush_max_age)?,

        replay_target_url: get("REPLAY_TARGET_URL").unwrap_or(defaults.replay_target_url),
        replay_speed,
        replay_timeout: get_secs("REPLAY_TIMEOUT_SECS", defaults.replay_timeout)?,
        replay_results_file: get("REPLAY_RESULTS_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.replay_results_file),
    })
}

/// Parse `KEY=VALUE` lines into a map, stripping optional double-quotes.
fn parse_conf(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, val)) = line.split_once('=') {
            let key = key.trim();
            let val = val.trim().trim_matches('"');
            map.insert(key.to_string(), val.to_string());
        }
    }
    map
}

// ─── tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_conf() {
        let text = r#"
# comment
CAPTURE_PATH="captures/"
FLUSH_MAX_EVENTS=3
REPLAY_TARGET_URL=http://staging:3001
"#;
        let map = parse_conf(text);
        assert_eq!(map["CAPTURE_PATH"], "captures/");
        assert_eq!(map["FLUSH_MAX_EVENTS"], "3");
        assert_eq!(map["REPLAY_TARGET_URL"], "http://staging:3001");
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.capture_path, PathBuf::from("events/"));
        assert!(config.capture_file.ends_with(".json"));
        assert_eq!(config.capture_listen_addr, "0.0.0.0:8000");
        assert_eq!(config.flush_max_events, 10);
        assert_eq!(config.flush_max_age, Duration::from_secs(2));
        assert_eq!(config.replay_speed, 1.0);
        assert_eq!(config.replay_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "CAPTURE_PATH=/tmp/caps\nCAPTURE_FILE=run.json\nFLUSH_MAX_AGE_SECS=0.5\n",
        )
        .unwrap();
        let config = load(&path).unwrap();
        assert_eq!(config.capture_file_path(), PathBuf::from("/tmp/caps/run.json"));
        assert_eq!(config.flush_max_age, Duration::from_millis(500));
    }

    #[test]
    fn test_rejects_zero_thresholds() {
        let map = HashMap::from([("FLUSH_MAX_EVENTS".to_string(), "0".to_string())]);
        assert!(from_map(&map).is_err());
        let map = HashMap::from([("FLUSH_MAX_AGE_SECS".to_string(), "0".to_string())]);
        assert!(from_map(&map).is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_or_default(&dir.path().join("absent.env")).unwrap();
        assert_eq!(config.flush_max_events, 10);
    }
}
