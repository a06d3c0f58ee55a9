//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!
//! Shutdown (shutdown.rs):
//!     Trigger → server stops accepting → maintenance and admin tasks exit
//! ```
//!
//! # Design Decisions
//! - One broadcast channel, every long-running task subscribes
//! - In-flight requests drain through axum's graceful shutdown

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_shutdown;
