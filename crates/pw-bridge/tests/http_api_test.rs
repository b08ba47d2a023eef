use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use pw_bridge::http_api::{api_router, ApiState};
use pw_bridge::source::{SourceError, StateSource};
use pw_core::types::{StateDocument, SummaryView, TaskActivity};
use pw_core::{SnapshotReader, WatchConfig};
use serde_json::Value;
use tower::ServiceExt;

struct FakeSource {
    doc: Arc<StateDocument>,
    calls: AtomicU64,
    fail: bool,
}

impl FakeSource {
    fn new(with_summary: bool) -> Self {
        let snapshot = SnapshotReader::new("/nonexistent/pipewatch-demo").read();
        Self {
            doc: Arc::new(StateDocument {
                snapshot,
                task_activity: TaskActivity::new(),
                llm_summary: with_summary.then(SummaryView::default),
            }),
            calls: AtomicU64::new(0),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(false)
        }
    }
}

#[async_trait]
impl StateSource for FakeSource {
    async fn current_state(&self) -> Result<Arc<StateDocument>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SourceError::Aborted("disk on fire".into()));
        }
        Ok(self.doc.clone())
    }

    fn refresh_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

fn app(source: Arc<FakeSource>) -> Router {
    let mut config = WatchConfig::new("/nonexistent/pipewatch-demo");
    config.poll_interval_secs = 10;
    api_router(Arc::new(ApiState::new(source, Arc::new(config))))
}

async fn get(app: Router, uri: &str) -> axum::response::Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn state_document_has_every_field() {
    let source = Arc::new(FakeSource::new(false));
    let resp = get(app(source.clone()), "/api/state").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["cache-control"], "no-cache");
    assert!(resp.headers().contains_key("x-request-id"));

    let body = json_body(resp).await;
    for key in [
        "project_name",
        "session",
        "phases",
        "task_state_meta",
        "audit_results",
        "artifacts",
        "timestamp",
        "changes",
        "task_activity",
    ] {
        assert!(body.get(key).is_some(), "missing {key}");
    }
    assert!(body.get("llm_summary").is_none());
    assert_eq!(body["project_name"], "pipewatch-demo");
    assert_eq!(body["phases"].as_array().unwrap().len(), 10);
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn summary_field_present_when_enabled() {
    let body = json_body(get(app(Arc::new(FakeSource::new(true))), "/api/state").await).await;
    assert!(body["llm_summary"].is_object());
    assert!(body["llm_summary"]["text"].is_null());
    assert!(body["llm_summary"]["generated_at"].is_null());
}

#[tokio::test]
async fn source_failure_is_json_503() {
    let resp = get(app(Arc::new(FakeSource::failing())), "/api/state").await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(resp).await;
    assert!(body["error"].as_str().unwrap().contains("disk on fire"));
}

#[tokio::test]
async fn index_serves_viewer_with_poll_period() {
    let resp = get(app(Arc::new(FakeSource::new(false))), "/").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("const POLL_MS = 10000;"));
    assert!(html.contains("/api/state"));
}

#[tokio::test]
async fn favicon_is_no_content() {
    let resp = get(app(Arc::new(FakeSource::new(false))), "/favicon.ico").await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn status_reports_refreshes() {
    let source = Arc::new(FakeSource::new(false));
    get(app(source.clone()), "/api/state").await;
    let body = json_body(get(app(source), "/api/status").await).await;
    assert!(body["version"].is_string());
    assert_eq!(body["poll_interval_secs"], 10);
    assert_eq!(body["refresh_count"], 1);
    assert!(body["uptime_seconds"].is_number());
}

#[tokio::test]
async fn metrics_are_prometheus_text() {
    let source = Arc::new(FakeSource::new(false));
    get(app(source.clone()), "/api/state").await;
    let resp = get(app(source), "/api/metrics").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("api_requests_total"));
}

#[tokio::test]
async fn unknown_route_is_json_404_with_request_id() {
    let resp = get(app(Arc::new(FakeSource::new(false))), "/api/nope").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(resp.headers().contains_key("x-request-id"));
    let body = json_body(resp).await;
    assert_eq!(body["error"], "not found: /api/nope");
}
