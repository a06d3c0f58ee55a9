//! Structured logging.
//!
//! JSON output in production, human-readable output in development.
//! `RUST_LOG` overrides the configured level.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Environment, ObservabilityConfig};

/// Install the global tracing subscriber.
///
/// Returns `false` if a subscriber was already installed.
pub fn init_logging(config: &ObservabilityConfig, environment: Environment) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "request_guard={level},tower_http={level}",
            level = config.log_level
        ))
    });

    let json = config.json_logs.unwrap_or(environment.is_production());
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry.with(fmt::layer().json().with_current_span(false)).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    installed.is_ok()
}
