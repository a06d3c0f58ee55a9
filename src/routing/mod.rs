//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Request path
//!     → classifier.rs (API namespace? strict sub-prefix?)
//!     → matcher.rs (segment-aware prefix checks)
//!     → Return: RouteKind::Page | RouteKind::Api(bucket)
//! ```
//!
//! # Design Decisions
//! - Rules compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same path always gets the same class

pub mod classifier;
pub mod matcher;

pub use classifier::{RouteClassifier, RouteKind};
