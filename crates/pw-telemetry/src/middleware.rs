use axum::{body::Body, extract::MatchedPath, extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics::global_metrics;

/// Axum middleware recording per-request metrics:
/// - `api_requests_total{method, route, status}`
/// - `api_request_duration_seconds{route}`
///
/// `route` is the matched route template, or `unmatched` for fallbacks, so
/// arbitrary request paths cannot grow the series set.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    let m = global_metrics();
    m.increment_counter(
        "api_requests_total",
        &[("method", &method), ("route", &route), ("status", &status)],
    );
    m.record_histogram(
        "api_request_duration_seconds",
        &[("route", &route)],
        start.elapsed().as_secs_f64(),
    );

    response
}
