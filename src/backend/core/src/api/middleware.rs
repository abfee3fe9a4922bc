//! Request id propagation and per-route request metrics.

use axum::{
    extract::{MatchedPath, Request},
    http::header::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::telemetry::RequestDurationHistogram;

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Echo `x-request-id`, generating one when the caller did not send it.
pub async fn request_id(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(&REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut response = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID, val);
    }
    response
}

/// Record `http_request_duration_seconds` labelled by the matched route
/// template, so ids never become label values.
pub async fn request_metrics(req: Request, next: Next) -> Response {
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let timer = RequestDurationHistogram::start(req.method().as_str(), &path);

    let response = next.run(req).await;
    timer.finish(response.status().as_u16());
    response
}
