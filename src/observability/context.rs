//! Request context capture.
//!
//! Turns an incoming request into the immutable [`RequestContext`] stored in
//! the log. Everything taken from the client is bounded and sanitized rather
//! than rejected: headers pass an allow-list, query keys are reduced to
//! `[A-Za-z0-9_-]`, values and paths are truncated.

use std::collections::BTreeMap;
use std::net::IpAddr;

use axum::http::{HeaderMap, Request};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::observability::request_log::SecurityFlags;

pub const MAX_QUERY_KEY_LEN: usize = 50;
pub const MAX_QUERY_VALUE_LEN: usize = 200;
pub const MAX_QUERY_PARAMS: usize = 50;
pub const MAX_HEADER_VALUE_LEN: usize = 512;
pub const MAX_PATH_LEN: usize = 2048;

/// Headers copied into the log. Anything else, including every
/// credential-bearing header, is dropped.
pub const LOGGED_HEADERS: &[&str] = &[
    "accept",
    "accept-encoding",
    "accept-language",
    "content-length",
    "content-type",
    "host",
    "origin",
    "referer",
    "user-agent",
    "x-forwarded-for",
    "x-forwarded-proto",
    "x-real-ip",
];

const SUSPICIOUS_MARKERS: &[&str] = &[
    "../",
    "..\\",
    "%2e%2e",
    "<script",
    "javascript:",
    "onerror=",
    "union select",
    "' or '1'='1",
    "; drop table",
    "/etc/passwd",
    "%00",
];

/// Sanitized, immutable view of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// Correlation id shared by every artifact of the request.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub url: String,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub ip: String,
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
}

impl RequestContext {
    /// Capture a request under correlation id `id`.
    ///
    /// `peer` is the direct connection address, used only when no
    /// forwarding header names the client. The returned flags record
    /// input that looked hostile or had to be altered.
    pub fn capture<B>(id: String, request: &Request<B>, peer: Option<IpAddr>) -> (Self, SecurityFlags) {
        let mut flags = SecurityFlags::default();
        let uri = request.uri();
        let headers = request.headers();

        let raw_path = uri.path();
        let raw_query = uri.query().unwrap_or_default();
        if looks_suspicious(raw_path) || looks_suspicious(raw_query) {
            flags.suspicious_activity = true;
        }

        let path = truncate(raw_path, MAX_PATH_LEN);
        let (query, altered) = parse_query(raw_query);
        if altered || path.len() != raw_path.len() {
            flags.invalid_input = true;
        }
        if query.values().any(|v| looks_suspicious(v)) {
            flags.suspicious_activity = true;
        }

        let (ip, forwarded_ok) = client_ip(headers, peer);
        if !forwarded_ok {
            flags.invalid_input = true;
        }

        let header_value = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| truncate(v, MAX_HEADER_VALUE_LEN))
        };

        let context = Self {
            id,
            timestamp: Utc::now(),
            method: request.method().to_string(),
            url: full_url(headers, &path, raw_query),
            path,
            query,
            headers: logged_headers(headers),
            ip,
            user_agent: header_value("user-agent").unwrap_or_else(|| "unknown".to_string()),
            referer: header_value("referer"),
        };
        (context, flags)
    }
}

/// Case-insensitive allow-list check.
pub fn is_logged_header(name: &str) -> bool {
    LOGGED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Copy allow-listed headers, joining repeated values with `, `.
pub fn logged_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        if !is_logged_header(name.as_str()) {
            continue;
        }
        let Ok(value) = value.to_str() else { continue };
        let value = truncate(value, MAX_HEADER_VALUE_LEN);
        out.entry(name.as_str().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    out
}

/// Reduce a query key to the safe charset and bounded length.
pub fn sanitize_query_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(MAX_QUERY_KEY_LEN)
        .collect()
}

/// Parse a raw query string. The flag is set when any key or value had to be
/// changed or dropped.
pub fn parse_query(raw: &str) -> (BTreeMap<String, String>, bool) {
    let mut query = BTreeMap::new();
    let mut altered = false;
    for (i, (key, value)) in url::form_urlencoded::parse(raw.as_bytes()).enumerate() {
        if i >= MAX_QUERY_PARAMS {
            altered = true;
            break;
        }
        let clean_key = sanitize_query_key(&key);
        if clean_key != key {
            altered = true;
        }
        if clean_key.is_empty() {
            continue;
        }
        let clean_value = truncate(&value, MAX_QUERY_VALUE_LEN);
        if clean_value.len() != value.len() {
            altered = true;
        }
        query.insert(clean_key, clean_value);
    }
    (query, altered)
}

/// Resolve the client address: first `x-forwarded-for` hop, then
/// `x-real-ip`, then the connection peer. The flag is false when a
/// forwarding header was present but unparseable.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> (String, bool) {
    let mut well_formed = true;
    for name in ["x-forwarded-for", "x-real-ip"] {
        let Some(raw) = headers.get(name).and_then(|v| v.to_str().ok()) else {
            continue;
        };
        let first = raw.split(',').next().unwrap_or_default().trim();
        match first.parse::<IpAddr>() {
            Ok(ip) => return (ip.to_string(), well_formed),
            Err(_) => well_formed = false,
        }
    }
    let ip = peer.map_or_else(|| "unknown".to_string(), |ip| ip.to_string());
    (ip, well_formed)
}

/// Whether `input` carries common traversal or injection markers.
pub fn looks_suspicious(input: &str) -> bool {
    let lower = input.to_ascii_lowercase();
    SUSPICIOUS_MARKERS.iter().any(|m| lower.contains(m))
}

fn full_url(headers: &HeaderMap, path: &str, query: &str) -> String {
    let host = headers
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .filter(|s| *s == "https" || *s == "http")
        .unwrap_or("http");
    let mut url = format!("{}://{}{}", scheme, truncate(host, 255), path);
    if !query.is_empty() {
        url.push('?');
        url.push_str(&truncate(query, MAX_PATH_LEN));
    }
    url
}

fn truncate(value: &str, max: usize) -> String {
    if value.len() <= max {
        return value.to_string();
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}
