mod handlers;
pub mod state;

pub use state::ApiState;

pub use self::router::api_router;

mod router {
    use super::*;
    use axum::{
        http::{HeaderValue, Method},
        middleware::from_fn,
        routing::get,
        Router,
    };
    use std::sync::Arc;
    use tower_http::cors::{AllowOrigin, CorsLayer};

    use pw_telemetry::middleware::metrics_middleware;
    use pw_telemetry::request_id::request_id_middleware;

    /// Build the read-only API router.
    pub fn api_router(state: Arc<ApiState>) -> Router {
        Router::new()
            .route("/", get(handlers::get_index))
            .route("/favicon.ico", get(handlers::get_favicon))
            .route("/api/state", get(handlers::get_state))
            .route("/api/status", get(handlers::get_status))
            .route("/api/metrics", get(handlers::get_metrics))
            .fallback(handlers::not_found)
            .layer(from_fn(metrics_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(
                CorsLayer::new()
                    .allow_origin(AllowOrigin::predicate(
                        |origin: &HeaderValue, _parts: &axum::http::request::Parts| {
                            origin.to_str().is_ok_and(is_local_origin)
                        },
                    ))
                    .allow_methods([Method::GET, Method::OPTIONS]),
            )
            .with_state(state)
    }

    fn is_local_origin(origin: &str) -> bool {
        ["http://localhost", "http://127.0.0.1", "http://[::1]"]
            .iter()
            .any(|prefix| {
                origin
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with(':'))
            })
    }

    #[cfg(test)]
    mod tests {
        use super::is_local_origin;

        #[test]
        fn only_loopback_origins_are_allowed() {
            assert!(is_local_origin("http://localhost:8420"));
            assert!(is_local_origin("http://127.0.0.1"));
            assert!(!is_local_origin("http://localhost.evil.com"));
            assert!(!is_local_origin("https://example.com"));
        }
    }
}
