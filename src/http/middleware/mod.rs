//! Request middleware.

pub mod guard;

pub use guard::{guard_middleware, Guard};
