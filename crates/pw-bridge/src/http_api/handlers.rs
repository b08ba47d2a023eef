use std::sync::Arc;

use axum::{
    extract::{OriginalUri, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    Json,
};
use serde::Serialize;

use pw_telemetry::metrics::global_metrics;

use super::state::ApiState;
use crate::api_error::ApiError;
use crate::viewer;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// GET /api/state -- the current (possibly cached) state document.
pub(crate) async fn get_state(
    State(state): State<Arc<ApiState>>,
) -> Result<impl IntoResponse, ApiError> {
    let doc = state.source.current_state().await?;
    Ok(([(header::CACHE_CONTROL, "no-cache")], Json(doc)))
}

// ---------------------------------------------------------------------------
// Status and metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct StatusResponse {
    version: &'static str,
    uptime_seconds: u64,
    project_dir: String,
    poll_interval_secs: u64,
    refresh_count: u64,
}

/// GET /api/status -- process liveness and refresh counters.
pub(crate) async fn get_status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        project_dir: state.config.project_dir.display().to_string(),
        poll_interval_secs: state.config.poll_interval_secs,
        refresh_count: state.source.refresh_count(),
    })
}

/// GET /api/metrics -- Prometheus text exposition.
pub(crate) async fn get_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        global_metrics().export_prometheus(),
    )
}

// ---------------------------------------------------------------------------
// Viewer
// ---------------------------------------------------------------------------

/// GET / -- built-in viewer page.
pub(crate) async fn get_index(State(state): State<Arc<ApiState>>) -> Html<String> {
    Html(viewer::render_index(state.config.poll_interval_secs))
}

/// GET /favicon.ico
pub(crate) async fn get_favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub(crate) async fn not_found(OriginalUri(uri): OriginalUri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}
