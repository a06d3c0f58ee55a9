//! Sliding-window rate limiting keyed by client identity and route class.
//!
//! Each check is one atomic admission against the identity's sliding log in
//! the shared store: a request is admitted while fewer than `limit` admitted
//! requests fall inside the trailing window. The limiter holds no state of
//! its own, so any number of tasks may call it concurrently for the same
//! identity.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::config::{RateLimitConfig, StoreFailurePolicy};
use crate::observability::metrics;
use crate::security::store::{CounterStore, StoreError};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Rate-limit bucket for an API route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitClass {
    /// General API traffic.
    General,
    /// Sensitive endpoints such as form submission.
    Strict,
}

impl LimitClass {
    pub fn as_str(self) -> &'static str {
        match self {
            LimitClass::General => "general",
            LimitClass::Strict => "strict",
        }
    }
}

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    /// Maximum requests per window.
    pub limit: u64,
    /// Requests left in the trailing window.
    pub remaining: u64,
    /// Epoch milliseconds at which the oldest counted request leaves the
    /// window, freeing a slot.
    pub reset: u64,
    pub allowed: bool,
}

impl RateLimitDecision {
    /// Whole seconds until reset, at least one.
    pub fn retry_after_secs(&self, now_ms: u64) -> u64 {
        self.reset.saturating_sub(now_ms).div_ceil(1000).max(1)
    }

    /// Write the `X-RateLimit-*` headers.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(self.reset));
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// Admission control over a shared counter store.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    window: Duration,
    general_max: u64,
    strict_max: u64,
    store_timeout: Duration,
    on_failure: StoreFailurePolicy,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig, store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            window: Duration::from_secs(config.window_secs.max(1)),
            general_max: config.general_max_requests,
            strict_max: config.strict_max_requests,
            store_timeout: Duration::from_millis(config.store_timeout_ms.max(1)),
            on_failure: config.on_store_failure,
        }
    }

    pub fn limit_for(&self, class: LimitClass) -> u64 {
        match class {
            LimitClass::General => self.general_max,
            LimitClass::Strict => self.strict_max,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// Check `identity` against the bucket for `class` at the current time.
    pub async fn check(&self, identity: &str, class: LimitClass) -> RateLimitDecision {
        self.check_at(identity, class, now_ms()).await
    }

    /// Check at an explicit time, resolving store failures by policy.
    pub async fn check_at(&self, identity: &str, class: LimitClass, now: u64) -> RateLimitDecision {
        match self.try_check_at(identity, class, now).await {
            Ok(decision) => decision,
            Err(e) => self.on_store_failure(identity, class, now, e),
        }
    }

    /// Check at an explicit time, surfacing store failures.
    pub async fn try_check_at(
        &self,
        identity: &str,
        class: LimitClass,
        now: u64,
    ) -> Result<RateLimitDecision, StoreError> {
        let key = format!("rl:{}:{}", class.as_str(), identity);
        let limit = self.limit_for(class);

        let hit = tokio::time::timeout(
            self.store_timeout,
            self.store.admit(&key, now, self.window, limit),
        )
        .await
        .map_err(|_| StoreError::Timeout(self.store_timeout.as_millis() as u64))??;

        let reset = hit.oldest_ms.unwrap_or(now).saturating_add(self.window_ms());
        Ok(RateLimitDecision {
            limit,
            remaining: limit.saturating_sub(hit.count),
            reset: reset.max(now + 1),
            allowed: hit.admitted,
        })
    }

    fn window_ms(&self) -> u64 {
        u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX).max(1)
    }

    fn on_store_failure(
        &self,
        identity: &str,
        class: LimitClass,
        now: u64,
        error: StoreError,
    ) -> RateLimitDecision {
        let limit = self.limit_for(class);
        let reset = now + self.window_ms();
        match self.on_failure {
            StoreFailurePolicy::FailClosed => {
                tracing::warn!(
                    client = %identity,
                    bucket = class.as_str(),
                    store = self.store.name(),
                    error = %error,
                    "Rate limit store failed, rejecting request"
                );
                metrics::record_store_error("fail_closed");
                RateLimitDecision {
                    limit,
                    remaining: 0,
                    reset,
                    allowed: false,
                }
            }
            StoreFailurePolicy::FailOpen => {
                tracing::warn!(
                    client = %identity,
                    bucket = class.as_str(),
                    store = self.store.name(),
                    error = %error,
                    "Rate limit store failed, admitting request"
                );
                metrics::record_store_error("fail_open");
                RateLimitDecision {
                    limit,
                    remaining: limit,
                    reset,
                    allowed: true,
                }
            }
        }
    }
}
