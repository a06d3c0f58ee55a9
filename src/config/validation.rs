//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and cross-field
//! consistency. All errors are collected, not just the first.

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::{GuardConfig, StoreKind, DEFAULT_ADMIN_KEY};
use crate::routing::matcher::{Matcher, PathPrefixMatcher};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address `{value}`")]
    InvalidAddress { field: &'static str, value: String },

    #[error("routing.api_prefix must start with '/' (got `{0}`)")]
    InvalidApiPrefix(String),

    #[error("routing.strict_prefixes: `{0}` is not inside the API namespace")]
    StrictPrefixOutsideApi(String),

    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),

    #[error("rate_limit.redis_url is required when store = \"redis\"")]
    MissingRedisUrl,

    #[error("rate_limit.store = \"redis\" requires the `redis-store` feature")]
    RedisStoreNotCompiled,

    #[error("csrf.{field}: `{value}` is not a valid {kind}")]
    InvalidCsrfName {
        field: &'static str,
        value: String,
        kind: &'static str,
    },

    #[error("admin.api_key must be changed before enabling the admin API")]
    DefaultAdminKey,
}

/// Validate a configuration, returning every problem found.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.is_empty() || config.admin.api_key == DEFAULT_ADMIN_KEY {
            errors.push(ValidationError::DefaultAdminKey);
        }
    }

    if !config.routing.api_prefix.starts_with('/') {
        errors.push(ValidationError::InvalidApiPrefix(config.routing.api_prefix.clone()));
    } else {
        let api = PathPrefixMatcher::new(config.routing.api_prefix.as_str());
        for prefix in &config.routing.strict_prefixes {
            if !api.matches(prefix) {
                errors.push(ValidationError::StrictPrefixOutsideApi(prefix.clone()));
            }
        }
    }

    let rl = &config.rate_limit;
    if rl.window_secs == 0 {
        errors.push(ValidationError::MustBePositive("rate_limit.window_secs"));
    }
    if rl.general_max_requests == 0 {
        errors.push(ValidationError::MustBePositive("rate_limit.general_max_requests"));
    }
    if rl.strict_max_requests == 0 {
        errors.push(ValidationError::MustBePositive("rate_limit.strict_max_requests"));
    }
    if rl.store_timeout_ms == 0 {
        errors.push(ValidationError::MustBePositive("rate_limit.store_timeout_ms"));
    }
    if rl.store == StoreKind::Redis {
        if rl.redis_url.as_deref().map_or(true, str::is_empty) {
            errors.push(ValidationError::MissingRedisUrl);
        }
        if !cfg!(feature = "redis-store") {
            errors.push(ValidationError::RedisStoreNotCompiled);
        }
    }

    if config.request_log.capacity == 0 {
        errors.push(ValidationError::MustBePositive("request_log.capacity"));
    }
    if config.request_log.sweep_interval_secs == 0 {
        errors.push(ValidationError::MustBePositive("request_log.sweep_interval_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::MustBePositive("timeouts.request_secs"));
    }

    if HeaderName::try_from(config.csrf.header_name.as_str()).is_err() {
        errors.push(ValidationError::InvalidCsrfName {
            field: "header_name",
            value: config.csrf.header_name.clone(),
            kind: "header name",
        });
    }
    if !is_cookie_name(&config.csrf.cookie_name) {
        errors.push(ValidationError::InvalidCsrfName {
            field: "cookie_name",
            value: config.csrf.cookie_name.clone(),
            kind: "cookie name",
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

// RFC 6265 token characters.
fn is_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GuardConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GuardConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.rate_limit.window_secs = 0;
        config.request_log.capacity = 0;
        config.csrf.cookie_name = "bad name;".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::MustBePositive("rate_limit.window_secs")));
        assert!(errors.contains(&ValidationError::MustBePositive("request_log.capacity")));
    }

    #[test]
    fn test_strict_prefix_must_be_under_api() {
        let mut config = GuardConfig::default();
        config.routing.strict_prefixes = vec!["/contact".into()];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::StrictPrefixOutsideApi("/contact".into())]
        );
    }

    #[test]
    fn test_strict_prefix_respects_segment_boundary() {
        let mut config = GuardConfig::default();
        config.routing.strict_prefixes = vec!["/apiary/x".into(), "/api/contact/".into()];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::StrictPrefixOutsideApi("/apiary/x".into())]
        );
    }

    #[test]
    fn test_admin_requires_real_key() {
        let mut config = GuardConfig::default();
        config.admin.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::DefaultAdminKey]);

        config.admin.api_key = "s3cret".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_redis_store_requires_url() {
        let mut config = GuardConfig::default();
        config.rate_limit.store = StoreKind::Redis;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::MissingRedisUrl));
    }
}
