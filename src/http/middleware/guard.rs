//! Security pipeline middleware.
//!
//! Runs once per inbound request, in order:
//! 1. correlation id, nonce and security headers
//! 2. sanitized context captured into the request log
//! 3. API routes: rate limit check, short-circuit with 429 on denial
//! 4. page routes: CSRF token issuance
//! 5. downstream handler
//! 6. response finalization and log close
//!
//! The log entry is held by a [`LogGuard`], so a panicking or cancelled
//! handler still closes it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{Body, HttpBody},
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::warn;
use uuid::Uuid;

use crate::config::GuardConfig;
use crate::http::request::{RequestMeta, X_NONCE, X_REQUEST_ID};
use crate::http::response::{rejection, HandlerError};
use crate::observability::context::RequestContext;
use crate::observability::metrics;
use crate::observability::request_log::{LogGuard, RequestLogger, SecurityFlag};
use crate::routing::{RouteClassifier, RouteKind};
use crate::security::csrf::{CsrfToken, CsrfTokenIssuer};
use crate::security::headers::{SecurityHeaderPolicy, SecurityHeaderSet};
use crate::security::nonce::NonceGenerator;
use crate::security::rate_limit::{self, RateLimitDecision, RateLimiter};
use crate::security::store::CounterStore;

/// Shared pipeline components, built once at startup.
pub struct Guard {
    nonces: Arc<NonceGenerator>,
    headers: SecurityHeaderPolicy,
    limiter: RateLimiter,
    csrf: CsrfTokenIssuer,
    logger: Arc<RequestLogger>,
    classifier: RouteClassifier,
    rate_limit_enabled: bool,
}

impl Guard {
    pub fn new(config: &GuardConfig, store: Arc<dyn CounterStore>) -> Self {
        let nonces = Arc::new(NonceGenerator::new());
        Self {
            headers: SecurityHeaderPolicy::new(config.environment),
            limiter: RateLimiter::new(&config.rate_limit, store),
            csrf: CsrfTokenIssuer::new(&config.csrf, config.environment, Arc::clone(&nonces)),
            logger: Arc::new(RequestLogger::new(config.request_log.capacity)),
            classifier: RouteClassifier::from_config(&config.routing),
            rate_limit_enabled: config.rate_limit.enabled,
            nonces,
        }
    }

    pub fn logger(&self) -> &Arc<RequestLogger> {
        &self.logger
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn classifier(&self) -> &RouteClassifier {
        &self.classifier
    }
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard")
            .field("classifier", &self.classifier)
            .field("rate_limit_enabled", &self.rate_limit_enabled)
            .finish_non_exhaustive()
    }
}

/// What the pipeline decided for a request before the handler runs.
enum Admission {
    Api(Option<RateLimitDecision>),
    Page(CsrfToken),
}

pub async fn guard_middleware(
    State(guard): State<Arc<Guard>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4().to_string();
    let nonce = guard.nonces.generate();
    let security = guard.headers.build(&nonce);

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let (context, flags) = RequestContext::capture(request_id.clone(), &request, peer);
    let method = context.method.clone();
    let client_ip = context.ip.clone();
    let route = guard.classifier.classify(&context.path);
    let log = guard.logger.track(context, flags);

    if flags.suspicious_activity {
        warn!(
            request_id = %request_id,
            client_ip = %client_ip,
            path = %request.uri().path(),
            "Suspicious request input"
        );
    }

    let admission = match route {
        RouteKind::Api(class) if guard.rate_limit_enabled => {
            let decision = guard.limiter.check(&client_ip, class).await;
            guard.logger.record_rate_limit(&request_id, decision);
            if !decision.allowed {
                guard.logger.flag(&request_id, SecurityFlag::RateLimited);
                warn!(
                    request_id = %request_id,
                    client_ip = %client_ip,
                    route_class = route.label(),
                    limit = decision.limit,
                    reset = decision.reset,
                    "Rate limit exceeded"
                );
                metrics::record_rate_limited(class.as_str());
                let response = rejection(&decision, rate_limit::now_ms());
                return finish(response, &request_id, &security, None, &method, route, start, log);
            }
            Admission::Api(Some(decision))
        }
        RouteKind::Api(_) => Admission::Api(None),
        RouteKind::Page => {
            let token = guard.csrf.issue();
            guard.logger.record_csrf_token(&request_id, token.value());
            Admission::Page(token)
        }
    };

    let csrf_token = match &admission {
        Admission::Page(token) => Some(token.value().to_string()),
        Admission::Api(_) => None,
    };
    set_correlation_headers(request.headers_mut(), &request_id, nonce.as_str());
    request.extensions_mut().insert(RequestMeta {
        request_id: request_id.clone(),
        nonce: nonce.as_str().to_string(),
        csrf_token,
    });

    let mut response = next.run(request).await;

    match &admission {
        Admission::Api(Some(decision)) => decision.apply_headers(response.headers_mut()),
        Admission::Api(None) => {}
        Admission::Page(token) => guard.csrf.apply(token, response.headers_mut()),
    }
    let error = response.extensions_mut().remove::<HandlerError>().map(|e| e.0);
    finish(response, &request_id, &security, error, &method, route, start, log)
}

/// Stamp the outgoing headers, record metrics and close the log entry.
#[allow(clippy::too_many_arguments)]
fn finish(
    mut response: Response,
    request_id: &str,
    security: &SecurityHeaderSet,
    error: Option<String>,
    method: &str,
    route: RouteKind,
    start: Instant,
    log: LogGuard,
) -> Response {
    let headers = response.headers_mut();
    security.apply(headers);
    set_correlation_headers(headers, request_id, security.nonce().as_str());

    let status = response.status();
    let error = error.or_else(|| {
        if status.is_server_error() {
            Some(status.canonical_reason().unwrap_or("Server Error").to_string())
        } else if status.as_u16() == 429 {
            Some("rate limited".to_string())
        } else {
            None
        }
    });

    metrics::record_request(method, status.as_u16(), route.label(), start);
    log.close(status.as_u16(), response_size(&response), error);
    response
}

fn set_correlation_headers(headers: &mut HeaderMap, request_id: &str, nonce: &str) {
    if let Ok(value) = HeaderValue::from_str(nonce) {
        headers.insert(X_NONCE, value);
    }
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(X_REQUEST_ID, value);
    }
}

fn response_size(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .or_else(|| response.body().size_hint().exact())
}
