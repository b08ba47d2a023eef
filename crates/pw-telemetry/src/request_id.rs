use axum::{
    body::Body,
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// 32 lowercase hex characters.
pub fn generate_request_id() -> String {
    Uuid::new_v4().as_simple().to_string()
}

/// Axum middleware that tags every request with an `x-request-id`.
///
/// A valid incoming id is reused; otherwise one is generated. The handler
/// runs inside an `http_request` span carrying the id, and the response
/// always echoes the header.
pub async fn request_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let header = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .filter(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| {
            HeaderValue::from_str(&generate_request_id())
                .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
        });
    request
        .headers_mut()
        .insert(REQUEST_ID_HEADER, header.clone());

    let span = tracing::info_span!(
        "http_request",
        request_id = header.to_str().unwrap_or("unknown"),
        method = %request.method(),
        path = %request.uri().path(),
    );

    let mut response = next.run(request).instrument(span).await;
    response.headers_mut().insert(REQUEST_ID_HEADER, header);
    response
}
