//! Request security pipeline library.
//!
//! An axum middleware stack that gives every inbound request a correlation
//! id and CSP nonce, hardens response headers, rate limits API routes,
//! issues CSRF tokens for pages and records everything in a bounded,
//! queryable request log.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::GuardConfig;
pub use http::{Guard, HttpServer, RequestMeta};
pub use lifecycle::Shutdown;
