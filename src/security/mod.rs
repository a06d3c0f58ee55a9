//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → nonce.rs (per-request CSP nonce)
//!     → headers.rs (CSP + hardening headers from the nonce)
//!     → rate_limit.rs (API routes: sliding-window check against store.rs)
//!     → csrf.rs (page routes: token cookie + mirrored header)
//!     → Pass to downstream handler
//! ```
//!
//! # Design Decisions
//! - Fail closed by default when the counter store is unreachable
//! - Entropy failure degrades, never aborts a request
//! - No trust in client input

pub mod csrf;
pub mod headers;
pub mod nonce;
pub mod rate_limit;
pub mod store;

pub use csrf::{CsrfToken, CsrfTokenIssuer};
pub use headers::{build_headers, SecurityHeaderPolicy, SecurityHeaderSet};
pub use nonce::{Nonce, NonceGenerator};
pub use rate_limit::{LimitClass, RateLimitDecision, RateLimiter};
pub use store::{CounterStore, InMemoryCounterStore, StoreError, WindowHit};
