//! Bounded in-memory request log with live metrics.
//!
//! # Responsibilities
//! - Store one [`LogEntry`] per request in a fixed-capacity ring buffer
//! - Close each entry exactly once with status, timing and size
//! - Maintain a [`MetricsSnapshot`] over the entries currently retained
//! - Answer recent/path/error/security queries and export the log
//!
//! # Design Decisions
//! - One mutex guards the buffer and its counters, so a reader never sees
//!   counts that disagree with the entries
//! - Eviction subtracts the evicted entry's contributions
//! - Closing an unknown or already-closed id is a silent no-op: entries may
//!   be evicted while their request is still in flight

use std::collections::{BTreeMap, VecDeque};
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use axum::http::Request;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::observability::context::RequestContext;
use crate::observability::export::{self, ExportError, ExportFormat};
use crate::observability::metrics;
use crate::security::rate_limit::RateLimitDecision;

/// Status recorded when a request future is dropped before completing.
pub const STATUS_ABORTED: u16 = 499;

/// Status recorded by the stale-entry sweep.
pub const STATUS_STALE: u16 = 408;

/// Security observations attached to an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityFlags {
    pub suspicious_activity: bool,
    pub rate_limited: bool,
    pub csrf_failure: bool,
    pub invalid_input: bool,
}

impl SecurityFlags {
    pub fn any(&self) -> bool {
        self.suspicious_activity || self.rate_limited || self.csrf_failure || self.invalid_input
    }

    pub fn raise(&mut self, flag: SecurityFlag) {
        match flag {
            SecurityFlag::SuspiciousActivity => self.suspicious_activity = true,
            SecurityFlag::RateLimited => self.rate_limited = true,
            SecurityFlag::CsrfFailure => self.csrf_failure = true,
            SecurityFlag::InvalidInput => self.invalid_input = true,
        }
    }

    fn raised(&self) -> impl Iterator<Item = &'static str> {
        [
            (self.suspicious_activity, "suspicious_activity"),
            (self.rate_limited, "rate_limited"),
            (self.csrf_failure, "csrf_failure"),
            (self.invalid_input, "invalid_input"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
    }
}

/// A single security flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityFlag {
    SuspiciousActivity,
    RateLimited,
    CsrfFailure,
    InvalidInput,
}

/// Lifecycle state of an entry. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    Open,
    Closed,
}

/// One request's log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(flatten)]
    pub context: RequestContext,
    pub state: EntryState,
    pub status_code: Option<u16>,
    /// Milliseconds from open to close.
    pub response_time: Option<f64>,
    pub response_size: Option<u64>,
    pub error: Option<String>,
    pub rate_limit: Option<RateLimitDecision>,
    pub csrf_token: Option<String>,
    pub security: SecurityFlags,
}

impl LogEntry {
    pub fn id(&self) -> &str {
        &self.context.id
    }

    pub fn is_open(&self) -> bool {
        self.state == EntryState::Open
    }

    pub fn is_error(&self) -> bool {
        self.status_code.is_some_and(|s| s >= 400)
    }
}

/// Completion data recorded when a request finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub status: u16,
    pub response_time_ms: f64,
    pub response_size: Option<u64>,
    pub error: Option<String>,
}

/// Aggregate metrics over the retained entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time: f64,
    pub slowest_response_time: f64,
    pub fastest_response_time: f64,
    pub requests_by_method: BTreeMap<String, u64>,
    pub requests_by_path: BTreeMap<String, u64>,
    pub requests_by_status: BTreeMap<u16, u64>,
    pub error_types: BTreeMap<String, u64>,
    pub security_events: u64,
    pub open_entries: u64,
    pub retained_entries: u64,
}

/// Filter applied by [`RequestLogger::query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFilter {
    Errors,
    Security,
}

/// A bounded log query.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub limit: usize,
    pub path: Option<String>,
    pub filter: Option<LogFilter>,
}

struct LogBuffer {
    entries: VecDeque<LogEntry>,
    metrics: MetricsSnapshot,
}

impl LogBuffer {
    fn find_mut(&mut self, id: &str) -> Option<&mut LogEntry> {
        self.entries.iter_mut().rev().find(|e| e.context.id == id)
    }

    fn record_open(&mut self, entry: &LogEntry) {
        let m = &mut self.metrics;
        m.total_requests += 1;
        m.open_entries += 1;
        *m.requests_by_method.entry(entry.context.method.clone()).or_default() += 1;
        *m.requests_by_path.entry(entry.context.path.clone()).or_default() += 1;
    }

    fn record_close(&mut self, entry: &LogEntry) {
        let m = &mut self.metrics;
        m.open_entries = m.open_entries.saturating_sub(1);
        if let Some(status) = entry.status_code {
            if is_success(status) {
                m.successful_requests += 1;
            } else {
                m.failed_requests += 1;
            }
            *m.requests_by_status.entry(status).or_default() += 1;
        }
        if let Some(error) = &entry.error {
            *m.error_types.entry(error.clone()).or_default() += 1;
        }
        if entry.security.any() {
            m.security_events += 1;
        }
    }

    fn forget(&mut self, entry: &LogEntry) {
        let m = &mut self.metrics;
        m.total_requests = m.total_requests.saturating_sub(1);
        decrement(&mut m.requests_by_method, &entry.context.method);
        decrement(&mut m.requests_by_path, &entry.context.path);
        match entry.state {
            EntryState::Open => m.open_entries = m.open_entries.saturating_sub(1),
            EntryState::Closed => {
                if let Some(status) = entry.status_code {
                    if is_success(status) {
                        m.successful_requests = m.successful_requests.saturating_sub(1);
                    } else {
                        m.failed_requests = m.failed_requests.saturating_sub(1);
                    }
                    decrement(&mut m.requests_by_status, &status);
                }
                if let Some(error) = &entry.error {
                    decrement(&mut m.error_types, error);
                }
                if entry.security.any() {
                    m.security_events = m.security_events.saturating_sub(1);
                }
            }
        }
    }

    fn recompute_response_times(&mut self) {
        let mut count = 0u64;
        let mut sum = 0.0;
        let mut slowest = f64::MIN;
        let mut fastest = f64::MAX;
        for t in self.entries.iter().filter_map(|e| e.response_time) {
            count += 1;
            sum += t;
            slowest = slowest.max(t);
            fastest = fastest.min(t);
        }
        let m = &mut self.metrics;
        if count == 0 {
            m.average_response_time = 0.0;
            m.slowest_response_time = 0.0;
            m.fastest_response_time = 0.0;
        } else {
            m.average_response_time = sum / count as f64;
            m.slowest_response_time = slowest;
            m.fastest_response_time = fastest;
        }
    }

    /// Apply a completion. Returns false if the id is unknown or closed.
    fn close(&mut self, id: &str, completion: Completion) -> bool {
        let Some(entry) = self.find_mut(id) else {
            return false;
        };
        if !entry.is_open() {
            return false;
        }
        entry.state = EntryState::Closed;
        entry.status_code = Some(completion.status);
        entry.response_time = Some(completion.response_time_ms);
        entry.response_size = completion.response_size;
        entry.error = completion.error;

        let closed = entry.clone();
        self.record_close(&closed);
        self.recompute_response_times();

        for flag in closed.security.raised() {
            metrics::record_security_event(flag);
        }
        if closed.security.any() {
            tracing::warn!(
                request_id = %closed.context.id,
                client_ip = %closed.context.ip,
                path = %closed.context.path,
                status = completion.status,
                flags = ?closed.security,
                "Security event recorded"
            );
        }
        true
    }
}

fn is_success(status: u16) -> bool {
    (200..400).contains(&status)
}

fn decrement<K: Ord>(map: &mut BTreeMap<K, u64>, key: &K) {
    if let Some(count) = map.get_mut(key) {
        *count = count.saturating_sub(1);
        if *count == 0 {
            map.remove(key);
        }
    }
}

/// Per-process request log service.
pub struct RequestLogger {
    capacity: usize,
    buffer: Mutex<LogBuffer>,
}

impl RequestLogger {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buffer: Mutex::new(LogBuffer {
                entries: VecDeque::with_capacity(capacity),
                metrics: MetricsSnapshot::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogBuffer> {
        // Entries stay consistent under a panicking reader, so recover.
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store a new open entry and return its correlation id.
    pub fn open(&self, context: RequestContext) -> String {
        self.open_flagged(context, SecurityFlags::default())
    }

    /// Store a new open entry carrying initial security flags.
    pub fn open_flagged(&self, mut context: RequestContext, flags: SecurityFlags) -> String {
        // The allow-list is enforced here too, whatever built the context.
        context
            .headers
            .retain(|name, _| crate::observability::context::is_logged_header(name));
        let id = context.id.clone();
        let entry = LogEntry {
            context,
            state: EntryState::Open,
            status_code: None,
            response_time: None,
            response_size: None,
            error: None,
            rate_limit: None,
            csrf_token: None,
            security: flags,
        };

        let mut buf = self.lock();
        let mut evicted_timed = false;
        while buf.entries.len() >= self.capacity {
            let Some(old) = buf.entries.pop_front() else { break };
            evicted_timed |= old.response_time.is_some();
            buf.forget(&old);
            metrics::record_log_evicted();
            tracing::trace!(request_id = %old.context.id, "Evicted log entry");
        }
        buf.record_open(&entry);
        buf.entries.push_back(entry);
        if evicted_timed {
            buf.recompute_response_times();
        }
        id
    }

    /// Capture `request` under a fresh correlation id and open its entry.
    pub fn open_request<B>(&self, request: &Request<B>, peer: Option<IpAddr>) -> String {
        let (context, flags) = RequestContext::capture(Uuid::new_v4().to_string(), request, peer);
        self.open_flagged(context, flags)
    }

    /// Open an entry and return a guard that closes it on every exit path.
    pub fn track(self: &Arc<Self>, context: RequestContext, flags: SecurityFlags) -> LogGuard {
        let id = self.open_flagged(context, flags);
        LogGuard {
            logger: Arc::clone(self),
            id,
            started: Instant::now(),
            closed: false,
        }
    }

    /// Record completion. Unknown or already-closed ids are ignored.
    pub fn close(&self, id: &str, completion: Completion) {
        let closed = self.lock().close(id, completion);
        if !closed {
            tracing::debug!(request_id = %id, "Close for missing or closed log entry ignored");
        }
    }

    /// Raise a security flag on an open entry.
    pub fn flag(&self, id: &str, flag: SecurityFlag) -> bool {
        self.update_open(id, |e| e.security.raise(flag))
    }

    /// Attach the rate-limit decision to an open entry.
    pub fn record_rate_limit(&self, id: &str, decision: RateLimitDecision) -> bool {
        self.update_open(id, |e| e.rate_limit = Some(decision))
    }

    /// Attach the issued CSRF token to an open entry.
    pub fn record_csrf_token(&self, id: &str, token: &str) -> bool {
        self.update_open(id, |e| e.csrf_token = Some(token.to_string()))
    }

    fn update_open(&self, id: &str, f: impl FnOnce(&mut LogEntry)) -> bool {
        let mut buf = self.lock();
        match buf.find_mut(id) {
            Some(entry) if entry.is_open() => {
                f(entry);
                true
            }
            _ => false,
        }
    }

    /// Close entries left open longer than `max_age`. Returns how many.
    pub fn sweep_stale(&self, max_age: Duration) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let now = Utc::now();
        let mut buf = self.lock();
        let stale: Vec<(String, f64)> = buf
            .entries
            .iter()
            .filter(|e| e.is_open() && now - e.context.timestamp > max_age)
            .map(|e| {
                let age = (now - e.context.timestamp).num_milliseconds() as f64;
                (e.context.id.clone(), age)
            })
            .collect();
        for (id, age) in &stale {
            buf.close(
                id,
                Completion {
                    status: STATUS_STALE,
                    response_time_ms: *age,
                    response_size: None,
                    error: Some("stale: no response recorded".to_string()),
                },
            );
        }
        if !stale.is_empty() {
            tracing::warn!(count = stale.len(), "Closed stale open log entries");
        }
        stale.len()
    }

    pub fn get(&self, id: &str) -> Option<LogEntry> {
        self.lock().entries.iter().find(|e| e.context.id == id).cloned()
    }

    /// Up to `limit` most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.collect(limit, |_| true)
    }

    pub fn by_path(&self, path: &str, limit: usize) -> Vec<LogEntry> {
        self.collect(limit, |e| e.context.path == path)
    }

    /// Entries with status >= 400.
    pub fn errors(&self, limit: usize) -> Vec<LogEntry> {
        self.collect(limit, LogEntry::is_error)
    }

    pub fn security_flagged(&self, limit: usize) -> Vec<LogEntry> {
        self.collect(limit, |e| e.security.any())
    }

    pub fn query(&self, query: &LogQuery) -> Vec<LogEntry> {
        self.collect(query.limit, |e| {
            let path_ok = query.path.as_deref().map_or(true, |p| e.context.path == p);
            let filter_ok = match query.filter {
                None => true,
                Some(LogFilter::Errors) => e.is_error(),
                Some(LogFilter::Security) => e.security.any(),
            };
            path_ok && filter_ok
        })
    }

    fn collect(&self, limit: usize, pred: impl Fn(&LogEntry) -> bool) -> Vec<LogEntry> {
        let limit = limit.min(self.capacity);
        self.lock()
            .entries
            .iter()
            .rev()
            .filter(|e| pred(e))
            .take(limit)
            .cloned()
            .collect()
    }

    /// All retained entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let buf = self.lock();
        let mut snapshot = buf.metrics.clone();
        snapshot.retained_entries = buf.entries.len() as u64;
        snapshot
    }

    /// Serialize the full retained log.
    pub fn export(&self, format: ExportFormat) -> Result<String, ExportError> {
        export::export(&self.entries(), format)
    }

    /// Drop every entry and reset metrics.
    pub fn clear(&self) {
        let mut buf = self.lock();
        buf.entries.clear();
        buf.metrics = MetricsSnapshot::default();
    }
}

impl std::fmt::Debug for RequestLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLogger")
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Scoped handle on an open entry.
///
/// [`LogGuard::close`] records the response. Dropping the guard without
/// closing (handler panic, client disconnect, cancelled future) records
/// status 499 so no entry is left open by the pipeline.
pub struct LogGuard {
    logger: Arc<RequestLogger>,
    id: String,
    started: Instant,
    closed: bool,
}

impl LogGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn logger(&self) -> &RequestLogger {
        &self.logger
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    pub fn close(mut self, status: u16, response_size: Option<u64>, error: Option<String>) {
        self.closed = true;
        self.logger.close(
            &self.id,
            Completion {
                status,
                response_time_ms: self.elapsed_ms(),
                response_size,
                error,
            },
        );
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.logger.close(
            &self.id,
            Completion {
                status: STATUS_ABORTED,
                response_time_ms: self.elapsed_ms(),
                response_size: None,
                error: Some("request aborted".to_string()),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn context(id: &str, method: &str, path: &str) -> RequestContext {
        let mut headers = BTreeMap::new();
        headers.insert("user-agent".to_string(), "test".to_string());
        RequestContext {
            id: id.to_string(),
            timestamp: Utc::now(),
            method: method.to_string(),
            url: format!("http://localhost{path}"),
            path: path.to_string(),
            query: BTreeMap::new(),
            headers,
            ip: "1.2.3.4".to_string(),
            user_agent: "test".to_string(),
            referer: None,
        }
    }

    fn done(status: u16, ms: f64) -> Completion {
        Completion {
            status,
            response_time_ms: ms,
            response_size: Some(10),
            error: None,
        }
    }

    #[test]
    fn test_open_and_close() {
        let logger = RequestLogger::new(10);
        let id = logger.open(context("a", "GET", "/"));
        assert_eq!(id, "a");
        assert!(logger.get("a").unwrap().is_open());

        logger.close("a", done(200, 12.0));
        let entry = logger.get("a").unwrap();
        assert_eq!(entry.state, EntryState::Closed);
        assert_eq!(entry.status_code, Some(200));
        assert_eq!(entry.response_time, Some(12.0));
        assert_eq!(entry.response_size, Some(10));
    }

    #[test]
    fn test_close_twice_is_noop() {
        let logger = RequestLogger::new(10);
        logger.open(context("a", "GET", "/"));
        logger.close("a", done(200, 10.0));
        logger.close("a", done(500, 99.0));

        let entry = logger.get("a").unwrap();
        assert_eq!(entry.status_code, Some(200));
        let m = logger.metrics();
        assert_eq!(m.successful_requests, 1);
        assert_eq!(m.failed_requests, 0);
    }

    #[test]
    fn test_close_unknown_id_is_ignored() {
        let logger = RequestLogger::new(10);
        logger.close("missing", done(200, 1.0));
        assert!(logger.is_empty());
        assert_eq!(logger.metrics(), MetricsSnapshot::default());
    }

    #[test]
    fn test_response_time_statistics() {
        let logger = RequestLogger::new(10);
        for (id, ms) in [("a", 100.0), ("b", 150.0), ("c", 300.0)] {
            logger.open(context(id, "GET", "/"));
            logger.close(id, done(200, ms));
        }
        let m = logger.metrics();
        assert!((m.average_response_time - 183.33).abs() < 0.01);
        assert_eq!(m.slowest_response_time, 300.0);
        assert_eq!(m.fastest_response_time, 100.0);
    }

    #[test]
    fn test_counts_by_method_path_status() {
        let logger = RequestLogger::new(10);
        logger.open(context("a", "GET", "/x"));
        logger.open(context("b", "POST", "/x"));
        logger.open(context("c", "GET", "/y"));
        logger.close("a", done(200, 1.0));
        logger.close("b", done(302, 1.0));
        logger.close(
            "c",
            Completion {
                status: 500,
                response_time_ms: 1.0,
                response_size: None,
                error: Some("Internal Server Error".into()),
            },
        );

        let m = logger.metrics();
        assert_eq!(m.total_requests, 3);
        assert_eq!(m.successful_requests, 2);
        assert_eq!(m.failed_requests, 1);
        assert_eq!(m.requests_by_method["GET"], 2);
        assert_eq!(m.requests_by_method["POST"], 1);
        assert_eq!(m.requests_by_path["/x"], 2);
        assert_eq!(m.requests_by_status[&500], 1);
        assert_eq!(m.error_types["Internal Server Error"], 1);
        assert_eq!(m.open_entries, 0);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let logger = RequestLogger::new(5);
        for i in 1..=5 {
            logger.open(context(&format!("req-{i}"), "GET", "/"));
        }
        assert_eq!(logger.len(), 5);

        logger.open(context("req-6", "GET", "/"));
        assert_eq!(logger.len(), 5);

        let ids: Vec<String> = logger.recent(5).into_iter().map(|e| e.context.id).collect();
        assert!(!ids.contains(&"req-1".to_string()));
        assert_eq!(ids[0], "req-6");
        assert_eq!(ids[4], "req-2");
    }

    #[test]
    fn test_eviction_adjusts_metrics() {
        let logger = RequestLogger::new(2);
        logger.open(context("a", "DELETE", "/old"));
        logger.close("a", done(500, 1000.0));
        logger.open(context("b", "GET", "/new"));
        logger.close("b", done(200, 10.0));
        logger.open(context("c", "GET", "/new"));

        let m = logger.metrics();
        assert_eq!(m.total_requests, 2);
        assert_eq!(m.retained_entries, 2);
        assert_eq!(m.failed_requests, 0);
        assert_eq!(m.successful_requests, 1);
        assert!(!m.requests_by_method.contains_key("DELETE"));
        assert!(!m.requests_by_path.contains_key("/old"));
        assert!(!m.requests_by_status.contains_key(&500));
        assert_eq!(m.slowest_response_time, 10.0);
        assert_eq!(m.open_entries, 1);

        // Closing an evicted entry does nothing
        logger.close("a", done(200, 1.0));
        assert_eq!(logger.metrics().successful_requests, 1);
    }

    #[test]
    fn test_security_events_counted_on_close() {
        let logger = RequestLogger::new(10);
        logger.open(context("a", "GET", "/api/data"));
        assert!(logger.flag("a", SecurityFlag::RateLimited));
        assert_eq!(logger.metrics().security_events, 0);
        logger.close("a", done(429, 1.0));
        assert_eq!(logger.metrics().security_events, 1);

        // Flags cannot change after close
        assert!(!logger.flag("a", SecurityFlag::CsrfFailure));
        assert!(!logger.get("a").unwrap().security.csrf_failure);

        let flagged = SecurityFlags {
            invalid_input: true,
            ..Default::default()
        };
        logger.open_flagged(context("b", "GET", "/"), flagged);
        logger.close("b", done(200, 1.0));
        assert_eq!(logger.metrics().security_events, 2);
        assert_eq!(logger.security_flagged(10).len(), 2);
    }

    #[test]
    fn test_queries_newest_first_and_bounded() {
        let logger = RequestLogger::new(10);
        for (i, status) in [200u16, 404, 200, 500, 200].iter().enumerate() {
            let id = format!("r{i}");
            let path = if i % 2 == 0 { "/even" } else { "/odd" };
            logger.open(context(&id, "GET", path));
            logger.close(&id, done(*status, 1.0));
        }

        let recent = logger.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id(), "r4");
        assert_eq!(recent[1].id(), "r3");

        let errors = logger.errors(10);
        let ids: Vec<&str> = errors.iter().map(LogEntry::id).collect();
        assert_eq!(ids, vec!["r3", "r1"]);

        assert_eq!(logger.by_path("/odd", 10).len(), 2);
        assert_eq!(logger.recent(1000).len(), 5);

        let q = LogQuery {
            limit: 10,
            path: Some("/even".into()),
            filter: Some(LogFilter::Errors),
        };
        assert!(logger.query(&q).is_empty());
    }

    #[test]
    fn test_headers_outside_allow_list_dropped_on_open() {
        let logger = RequestLogger::new(10);
        let mut ctx = context("a", "GET", "/");
        ctx.headers.insert("Authorization".into(), "Bearer secret".into());
        ctx.headers.insert("cookie".into(), "s=1".into());
        logger.open(ctx);
        let entry = &logger.recent(1)[0];
        assert!(!entry.context.headers.contains_key("Authorization"));
        assert!(!entry.context.headers.contains_key("authorization"));
        assert!(!entry.context.headers.contains_key("cookie"));
        assert!(entry.context.headers.contains_key("user-agent"));
    }

    #[test]
    fn test_open_request_captures_sanitized_context() {
        let logger = RequestLogger::new(10);
        let request = Request::builder()
            .uri("/files/../../etc/passwd?x=1")
            .header("x-forwarded-for", "9.8.7.6, 10.0.0.1")
            .header("authorization", "Bearer secret")
            .body(())
            .unwrap();
        let id = logger.open_request(&request, None);
        assert!(Uuid::parse_str(&id).is_ok());

        let entry = logger.get(&id).unwrap();
        assert_eq!(entry.context.ip, "9.8.7.6");
        assert!(entry.security.suspicious_activity);
        assert!(!entry.context.headers.contains_key("authorization"));
    }

    #[test]
    fn test_guard_drop_closes_entry() {
        let logger = Arc::new(RequestLogger::new(10));
        {
            let _guard = logger.track(context("a", "GET", "/"), SecurityFlags::default());
        }
        let entry = logger.get("a").unwrap();
        assert_eq!(entry.status_code, Some(STATUS_ABORTED));
        assert_eq!(entry.error.as_deref(), Some("request aborted"));

        let guard = logger.track(context("b", "GET", "/"), SecurityFlags::default());
        guard.close(204, Some(0), None);
        assert_eq!(logger.get("b").unwrap().status_code, Some(204));
        assert_eq!(logger.metrics().open_entries, 0);
    }

    #[test]
    fn test_sweep_closes_only_stale_entries() {
        let logger = RequestLogger::new(10);
        let mut old = context("old", "GET", "/");
        old.timestamp = Utc::now() - chrono::Duration::seconds(600);
        logger.open(old);
        logger.open(context("fresh", "GET", "/"));

        assert_eq!(logger.sweep_stale(Duration::from_secs(300)), 1);
        let stale = logger.get("old").unwrap();
        assert_eq!(stale.status_code, Some(STATUS_STALE));
        assert!(stale.response_time.unwrap() >= 600_000.0);
        assert!(logger.get("fresh").unwrap().is_open());
        assert_eq!(logger.sweep_stale(Duration::from_secs(300)), 0);
    }

    #[test]
    fn test_clear_resets_everything() {
        let logger = RequestLogger::new(10);
        logger.open(context("a", "GET", "/"));
        logger.close("a", done(200, 5.0));
        logger.clear();
        assert!(logger.is_empty());
        assert_eq!(logger.metrics(), MetricsSnapshot::default());
    }

    #[test]
    fn test_concurrent_open_close() {
        let logger = Arc::new(RequestLogger::new(1000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let logger = logger.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let id = format!("t{t}-{i}");
                        logger.open(context(&id, "GET", "/"));
                        logger.close(&id, done(200, 1.0));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let m = logger.metrics();
        assert_eq!(m.total_requests, 800);
        assert_eq!(m.successful_requests, 800);
        assert_eq!(m.open_entries, 0);
    }
}
