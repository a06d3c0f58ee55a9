//! Request-side metadata attached by the guard.
//!
//! # Responsibilities
//! - Name the headers added to forwarded requests
//! - Carry per-request security values to downstream handlers
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Handlers read [`RequestMeta`] from extensions instead of re-parsing headers

use axum::http::HeaderName;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const X_NONCE: HeaderName = HeaderName::from_static("x-nonce");

/// Security values for one request, available as a request extension.
///
/// ```ignore
/// async fn page(Extension(meta): Extension<RequestMeta>) -> Html<String> {
///     Html(format!("<script nonce=\"{}\">...</script>", meta.nonce))
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMeta {
    /// Correlation id, equal to the log entry id.
    pub request_id: String,
    /// CSP nonce for inline scripts and styles.
    pub nonce: String,
    /// Issued CSRF token. `None` on API routes.
    pub csrf_token: Option<String>,
}
