//! Route classification.
//!
//! Decides which policies apply to a request path: API routes are rate
//! limited (general or strict bucket) and never get a CSRF cookie; every
//! other path gets a CSRF token and no rate limit.

use crate::config::RoutingConfig;
use crate::routing::matcher::{Matcher, PathPrefixMatcher};
use crate::security::rate_limit::LimitClass;

/// Policy class of a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// Non-API path: CSRF issuance, no rate limit.
    Page,
    /// API path: rate limited in the given bucket.
    Api(LimitClass),
}

impl RouteKind {
    pub fn is_api(self) -> bool {
        matches!(self, RouteKind::Api(_))
    }

    /// Label used for metrics and logs.
    pub fn label(self) -> &'static str {
        match self {
            RouteKind::Page => "page",
            RouteKind::Api(LimitClass::General) => "api",
            RouteKind::Api(LimitClass::Strict) => "api_strict",
        }
    }
}

/// Compiled classification rules. Immutable after construction.
#[derive(Debug, Clone)]
pub struct RouteClassifier {
    api: PathPrefixMatcher,
    strict: Vec<PathPrefixMatcher>,
}

impl RouteClassifier {
    pub fn from_config(config: &RoutingConfig) -> Self {
        Self {
            api: PathPrefixMatcher::new(config.api_prefix.as_str()),
            strict: config
                .strict_prefixes
                .iter()
                .map(|p| PathPrefixMatcher::new(p.as_str()))
                .collect(),
        }
    }

    pub fn classify(&self, path: &str) -> RouteKind {
        if !self.api.matches(path) {
            return RouteKind::Page;
        }
        if self.strict.iter().any(|m| m.matches(path)) {
            RouteKind::Api(LimitClass::Strict)
        } else {
            RouteKind::Api(LimitClass::General)
        }
    }
}
