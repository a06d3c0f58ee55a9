//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GuardConfig (validated, immutable)
//!     → passed explicitly to the header policy, limiter and CSRF issuer
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - The dev/prod switch lives here and nowhere else

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, CsrfConfig, Environment, GuardConfig, ListenerConfig, ObservabilityConfig,
    RateLimitConfig, RequestLogConfig, RoutingConfig, StoreFailurePolicy, StoreKind,
};
