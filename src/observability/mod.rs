//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → context.rs (sanitized RequestContext + security flags)
//!     → request_log.rs (bounded ring buffer, live MetricsSnapshot)
//!     → export.rs (JSON / CSV dumps for the admin API)
//!
//! All subsystems also produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (Prometheus counters and histograms)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - The request id flows through the log entry, response headers and events
//! - Credential-bearing headers never reach any sink
//! - Metrics are cheap (atomic increments)

pub mod context;
pub mod export;
pub mod logging;
pub mod metrics;
pub mod request_log;

pub use context::RequestContext;
pub use export::{ExportError, ExportFormat};
pub use request_log::{
    Completion, EntryState, LogEntry, LogFilter, LogGuard, LogQuery, MetricsSnapshot,
    RequestLogger, SecurityFlag, SecurityFlags,
};
