use axum::{
    body::Body,
    http::{Request, Response},
};
use std::time::Duration;
use tracing::{Span, info};

use super::request_id::REQUEST_ID_HEADER;

/// Span for one request. Runs inside the request-id middleware, so the id
/// is always present by now.
pub fn make_request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    tracing::info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}

pub fn log_request(request: &Request<Body>, _span: &Span) {
    info!("📥 {} {}", request.method(), request.uri());
}

pub fn log_response(response: &Response<Body>, latency: Duration, _span: &Span) {
    info!(
        "📤 Finished in {:?} with status {}",
        latency,
        response.status()
    );
}
