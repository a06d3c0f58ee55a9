//! Response construction for guard-generated responses.
//!
//! # Responsibilities
//! - Build the 429 rejection for rate-limited requests
//! - Let handlers report an error string for the request log
//!
//! # Design Decisions
//! - Rejections carry the same rate-limit headers as admitted responses
//! - Security headers are added by the middleware, not here

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};

use crate::security::rate_limit::RateLimitDecision;

pub const RATE_LIMITED_BODY: &str = "Too many requests";

/// Error description a handler attaches to its response.
///
/// The guard records it as the log entry's error. Without it, 5xx responses
/// are logged with the status reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError(pub String);

/// Build the 429 response for a denied decision.
pub fn rejection(decision: &RateLimitDecision, now_ms: u64) -> Response {
    let mut response = Response::new(Body::from(RATE_LIMITED_BODY));
    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        header::RETRY_AFTER,
        HeaderValue::from(decision.retry_after_secs(now_ms)),
    );
    decision.apply_headers(headers);
    response
}
