//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_requests_total` (counter): requests by method, status, route class
//! - `guard_request_duration_seconds` (histogram): end-to-end latency
//! - `guard_rate_limited_total` (counter): rejections by bucket
//! - `guard_security_events_total` (counter): flagged entries by kind
//! - `guard_entropy_fallback_total` (counter): degraded random generation
//! - `guard_rate_limit_store_errors_total` (counter): store failures by policy
//! - `guard_log_entries_evicted_total` (counter): ring buffer evictions
//!
//! Updates go through the `metrics` facade and are no-ops until a recorder
//! is installed with [`init_metrics`].

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, route_class: &'static str, start: Instant) {
    counter!(
        "guard_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route_class" => route_class
    )
    .increment(1);
    histogram!("guard_request_duration_seconds", "route_class" => route_class)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(bucket: &'static str) {
    counter!("guard_rate_limited_total", "bucket" => bucket).increment(1);
}

pub fn record_security_event(kind: &'static str) {
    counter!("guard_security_events_total", "kind" => kind).increment(1);
}

pub fn record_entropy_fallback() {
    counter!("guard_entropy_fallback_total").increment(1);
}

pub fn record_store_error(policy: &'static str) {
    counter!("guard_rate_limit_store_errors_total", "policy" => policy).increment(1);
}

pub fn record_log_evicted() {
    counter!("guard_log_entries_evicted_total").increment(1);
}
