//! HTTP listener that turns inbound requests into captured events.
//!
//! Routes:
//!   POST /<any-path>        → capture the request
//!   GET  /capture/status    → capture status
//!   POST /capture/reset     → start a new, empty session
//!   GET  /api/health        → health check

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

use detritus_common::event::{EventBody, RawRequest};
use detritus_common::protocol::{
    CaptureErrorResponse, CapturedResponse, HealthResponse, ResetResponse, StatusResponse,
};
use detritus_common::timestamp;

use crate::coordinator::{CaptureCoordinator, CaptureError};

/// Shared state for route handlers.
#[derive(Clone)]
struct AppState {
    coordinator: Arc<CaptureCoordinator>,
    start_time: Instant,
}

pub fn router(coordinator: Arc<CaptureCoordinator>) -> Router {
    let state = AppState {
        coordinator,
        start_time: Instant::now(),
    };

    Router::new()
        .route("/api/health", get(health))
        .route("/capture/status", get(status))
        .route("/capture/reset", post(reset))
        .route("/", post(capture))
        .route("/{*path}", post(capture))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server. Blocks until shutdown.
pub async fn run(
    coordinator: Arc<CaptureCoordinator>,
    listen_addr: &str,
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let app = router(coordinator);

    let listener = TcpListener::bind(listen_addr).await?;
    info!("Capture HTTP server listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_millis(250)).await;
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
            }
        })
        .await?;

    Ok(())
}

// ── route handlers ───────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn capture(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let raw = RawRequest {
        path: uri.path().to_string(),
        method: method.to_string(),
        body: EventBody::from_bytes(&body, is_json(&headers)),
        headers: header_map(&headers),
        query_params: (!query.is_empty()).then_some(query),
    };
    let path = raw.path.clone();
    let method = raw.method.clone();

    let coordinator = state.coordinator.clone();
    let result = tokio::task::spawn_blocking(move || coordinator.capture(raw)).await;

    match result {
        Ok(Ok(sequence)) => {
            info!("[{sequence}] Captured {method} to {path}");
            Json(CapturedResponse {
                status: "captured".to_string(),
                sequence,
            })
            .into_response()
        }
        Ok(Err(e)) => {
            error!("Capture of {method} {path} failed: {e}");
            let sequence = match &e {
                CaptureError::NotDurable { sequence, .. } => Some(*sequence),
                _ => None,
            };
            server_error(sequence, e.to_string())
        }
        Err(e) => {
            error!("Capture task failed: {e}");
            server_error(None, e.to_string())
        }
    }
}

async fn status(State(state): State<AppState>) -> Response {
    // Waits on the coordinator lock, which a flush holds across file I/O.
    let coordinator = state.coordinator.clone();
    match tokio::task::spawn_blocking(move || coordinator.status()).await {
        Ok(Ok(s)) => {
            debug!(
                "Status: {} captured, {} pending, {} flush(es) / {} event(s) persisted",
                s.total_events, s.pending, s.flush_stats.flushes, s.flush_stats.flushed_events
            );
            Json(StatusResponse {
                total_events: s.total_events,
                json_file: s.json_file,
                session_start: timestamp::format(&s.session_start),
            })
            .into_response()
        }
        Ok(Err(e)) => server_error(None, e.to_string()),
        Err(e) => server_error(None, e.to_string()),
    }
}

async fn reset(State(state): State<AppState>) -> Response {
    let coordinator = state.coordinator.clone();
    match tokio::task::spawn_blocking(move || coordinator.reset()).await {
        Ok(Ok(())) => Json(ResetResponse {
            status: "reset".to_string(),
            message: "All captured events cleared".to_string(),
        })
        .into_response(),
        Ok(Err(e)) => {
            error!("Reset failed: {e}");
            server_error(None, e.to_string())
        }
        Err(e) => server_error(None, e.to_string()),
    }
}

// ── helpers ──────────────────────────────────────────────────────────────

fn server_error(sequence: Option<u64>, message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(CaptureErrorResponse {
            status: "error".to_string(),
            sequence,
            message,
        }),
    )
        .into_response()
}

/// `application/json` or any `+json` media type.
fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
        })
        .unwrap_or(false)
}

/// Flatten headers to strings.  Repeated headers are joined with `, `.
fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        map.entry(name.as_str().to_string())
            .and_modify(|v| {
                v.push_str(", ");
                v.push_str(&value);
            })
            .or_insert(value);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use detritus_common::session;

    use crate::accumulator::tests::MemStore;
    use crate::accumulator::FlushPolicy;

    fn app(max_events: usize) -> (Router, Arc<MemStore>, Arc<CaptureCoordinator>) {
        let store = MemStore::with_session();
        let coordinator = Arc::new(
            CaptureCoordinator::new(
                store.clone(),
                FlushPolicy::new(max_events, Duration::from_secs(3600)),
            )
            .unwrap(),
        );
        (router(coordinator.clone()), store, coordinator)
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_capture_json_post() {
        let (app, store, _) = app(1);
        let req = Request::post("/hooks/github?delivery=7")
            .header("content-type", "application/json")
            .header("x-github-event", "push")
            .body(Body::from(r#"{"ref":"refs/heads/main"}"#))
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["status"], "captured");
        assert_eq!(body["sequence"], 1);

        let events = session::load(store.as_ref()).unwrap().events;
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.path, "/hooks/github");
        assert_eq!(e.method, "POST");
        assert_eq!(e.headers["x-github-event"], "push");
        assert_eq!(e.query_params.as_ref().unwrap()["delivery"], "7");
        assert!(e.body.is_json());
    }

    #[tokio::test]
    async fn test_capture_text_post_without_query() {
        let (app, store, _) = app(1);
        let req = Request::post("/plain")
            .header("content-type", "text/plain")
            .body(Body::from("hello"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let e = &session::load(store.as_ref()).unwrap().events[0];
        assert_eq!(e.body, EventBody::Text("hello".into()));
        assert!(e.query_params.is_none());
    }

    #[tokio::test]
    async fn test_status_and_reset() {
        let (app, _, coordinator) = app(10);
        coordinator.capture(RawRequest::default()).unwrap();
        coordinator.capture(RawRequest::default()).unwrap();

        let resp = app
            .clone()
            .oneshot(Request::get("/capture/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["total_events"], 2);
        assert_eq!(body["json_file"], "memory");
        assert!(body["session_start"].is_string());

        let resp = app
            .clone()
            .oneshot(Request::post("/capture/reset").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["status"], "reset");

        let resp = app
            .oneshot(Request::post("/again").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(resp).await["sequence"], 1);
    }

    #[tokio::test]
    async fn test_status_during_flush_does_not_stall_runtime() {
        let (app, store, coordinator) = app(1);
        store.write_delay_ms.store(300, Ordering::SeqCst);

        // holds the coordinator lock for the whole slow flush
        let writer = std::thread::spawn(move || coordinator.capture(RawRequest::default()));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        let ticker = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            started.elapsed()
        });

        let resp = app
            .oneshot(Request::get("/capture/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["total_events"], 1);

        let ticked = ticker.await.unwrap();
        assert!(ticked < Duration::from_millis(200), "runtime stalled for {ticked:?}");
        assert_eq!(writer.join().unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_server_error() {
        let (app, store, _) = app(1);
        store.fail.store(true, Ordering::SeqCst);
        let resp = app
            .oneshot(Request::post("/x").body(Body::from("y")).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(resp).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["sequence"], 1);
    }

    #[test]
    fn test_is_json() {
        let mut h = HeaderMap::new();
        assert!(!is_json(&h));
        h.insert(header::CONTENT_TYPE, "application/json; charset=utf-8".parse().unwrap());
        assert!(is_json(&h));
        h.insert(header::CONTENT_TYPE, "application/vnd.api+json".parse().unwrap());
        assert!(is_json(&h));
        h.insert(header::CONTENT_TYPE, "text/json-ish".parse().unwrap());
        assert!(!is_json(&h));
    }
}
