//! Observability for pipewatch.
//!
//! - **Logging**: human-readable or JSON output via `tracing-subscriber`
//! - **Metrics**: process-wide counters, gauges and histograms with Prometheus export
//! - **Middleware**: axum layers for request IDs and per-route request metrics

pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod request_id;
