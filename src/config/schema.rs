//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files, and
//! every field has a default so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Root configuration for the request guard.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Deployment environment. Drives CSP strictness and cookie `Secure` flag.
    pub environment: Environment,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Route classification (API namespace, strict sub-prefixes).
    pub routing: RoutingConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// CSRF token issuance.
    pub csrf: CsrfConfig,

    /// In-memory request log.
    pub request_log: RequestLogConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Deployment environment.
///
/// Unknown values deserialize to `Production`, the strict behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    #[serde(other)]
    Production,
}

impl Environment {
    pub fn is_development(self) -> bool {
        self == Environment::Development
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    /// Parse a free-form environment name, defaulting to production.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            _ => Environment::Production,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for the downstream handler) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Route classification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Path prefix of the API namespace. Matching paths are rate limited
    /// and never receive a CSRF cookie.
    pub api_prefix: String,

    /// Sub-prefixes of the API namespace mapped to the strict bucket.
    pub strict_prefixes: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            api_prefix: "/api".to_string(),
            strict_prefixes: vec!["/api/contact".to_string()],
        }
    }
}

/// Backing store for rate-limit counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    Redis,
}

/// What to do when the counter store cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailurePolicy {
    /// Treat the request as rate limited.
    #[default]
    FailClosed,
    /// Admit the request.
    FailOpen,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting of API routes.
    pub enabled: bool,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Maximum requests per window for general API routes.
    pub general_max_requests: u64,

    /// Maximum requests per window for strict routes.
    pub strict_max_requests: u64,

    /// Counter store backend.
    pub store: StoreKind,

    /// Connection URL for the redis store.
    pub redis_url: Option<String>,

    /// Deadline for a single store round-trip in milliseconds.
    pub store_timeout_ms: u64,

    /// Decision applied when the store is unreachable or times out.
    pub on_store_failure: StoreFailurePolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 60,
            general_max_requests: 100,
            strict_max_requests: 5,
            store: StoreKind::Memory,
            redis_url: None,
            store_timeout_ms: 250,
            on_store_failure: StoreFailurePolicy::FailClosed,
        }
    }
}

/// CSRF token issuance configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    pub cookie_name: String,
    pub header_name: String,
    pub max_age_secs: u64,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            cookie_name: "csrf-token".to_string(),
            header_name: "x-csrf-token".to_string(),
            max_age_secs: 86_400,
        }
    }
}

/// Request log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestLogConfig {
    /// Maximum retained entries; oldest are evicted first.
    pub capacity: usize,

    /// Entries left open longer than this are closed by the sweeper.
    pub stale_after_secs: u64,

    /// Interval between maintenance sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for RequestLogConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            stale_after_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON logs. Unset means JSON in production, plain text otherwise.
    pub json_logs: Option<bool>,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: None,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

pub const DEFAULT_ADMIN_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: DEFAULT_ADMIN_KEY.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: GuardConfig = toml::from_str("").unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.routing.api_prefix, "/api");
        assert_eq!(config.rate_limit.general_max_requests, 100);
        assert_eq!(config.rate_limit.on_store_failure, StoreFailurePolicy::FailClosed);
        assert_eq!(config.csrf.max_age_secs, 86_400);
        assert_eq!(config.request_log.capacity, 1000);
    }

    #[test]
    fn test_unknown_environment_is_production() {
        let config: GuardConfig = toml::from_str("environment = \"staging\"").unwrap();
        assert_eq!(config.environment, Environment::Production);

        let config: GuardConfig = toml::from_str("environment = \"development\"").unwrap();
        assert!(config.environment.is_development());

        assert_eq!(Environment::from_name("DEV"), Environment::Development);
        assert_eq!(Environment::from_name("qa"), Environment::Production);
    }

    #[test]
    fn test_partial_sections() {
        let config: GuardConfig = toml::from_str(
            r#"
            [rate_limit]
            general_max_requests = 10
            on_store_failure = "fail_open"

            [routing]
            strict_prefixes = ["/api/contact", "/api/login"]
            "#,
        )
        .unwrap();
        assert_eq!(config.rate_limit.general_max_requests, 10);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.rate_limit.on_store_failure, StoreFailurePolicy::FailOpen);
        assert_eq!(config.routing.strict_prefixes.len(), 2);
    }
}
