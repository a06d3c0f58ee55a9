//! HTTP handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers, maintenance task)
//!     → middleware/guard.rs (nonce, headers, log, rate limit / CSRF)
//!     → application handler (reads RequestMeta from extensions)
//!     → middleware/guard.rs (finalize headers, close log entry)
//!     → Send to client
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use middleware::{guard_middleware, Guard};
pub use request::{RequestMeta, X_NONCE, X_REQUEST_ID};
pub use response::HandlerError;
pub use server::HttpServer;
