//! Security response headers.
//!
//! Builds the Content-Security-Policy for a nonce plus the fixed hardening
//! headers. The result is a pure function of (nonce, environment): the
//! development build loosens script/style/connect rules for tooling, the
//! production build adds `upgrade-insecure-requests`.

use axum::http::{
    header::{
        CONTENT_SECURITY_POLICY, REFERRER_POLICY, STRICT_TRANSPORT_SECURITY,
        X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
    },
    HeaderMap, HeaderName, HeaderValue,
};

use crate::config::Environment;
use crate::security::nonce::Nonce;

pub const PERMISSIONS_POLICY: HeaderName = HeaderName::from_static("permissions-policy");

const HSTS: &str = "max-age=31536000; includeSubDomains";
const PERMISSIONS: &str =
    "camera=(), microphone=(), geolocation=(), payment=(), usb=(), interest-cohort=()";

/// The full set of security headers for one response.
#[derive(Debug, Clone)]
pub struct SecurityHeaderSet {
    nonce: Nonce,
    csp: String,
    hardening: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaderSet {
    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    pub fn csp(&self) -> &str {
        &self.csp
    }

    /// The fixed headers, excluding CSP.
    pub fn hardening(&self) -> &[(HeaderName, HeaderValue)] {
        &self.hardening
    }

    /// Write all headers into `headers`, replacing existing values.
    pub fn apply(&self, headers: &mut HeaderMap) {
        if let Ok(value) = HeaderValue::from_str(&self.csp) {
            headers.insert(CONTENT_SECURITY_POLICY, value);
        }
        for (name, value) in &self.hardening {
            headers.insert(name.clone(), value.clone());
        }
    }
}

/// Header policy bound to one environment.
#[derive(Debug, Clone, Copy)]
pub struct SecurityHeaderPolicy {
    environment: Environment,
}

impl SecurityHeaderPolicy {
    pub fn new(environment: Environment) -> Self {
        Self { environment }
    }

    pub fn build(&self, nonce: &Nonce) -> SecurityHeaderSet {
        build_headers(nonce, self.environment)
    }
}

/// Build the header set for `nonce` under `env`.
pub fn build_headers(nonce: &Nonce, env: Environment) -> SecurityHeaderSet {
    SecurityHeaderSet {
        nonce: nonce.clone(),
        csp: content_security_policy(nonce, env),
        hardening: vec![
            (X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
            (X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
            (STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS)),
            (
                REFERRER_POLICY,
                HeaderValue::from_static("strict-origin-when-cross-origin"),
            ),
            (PERMISSIONS_POLICY, HeaderValue::from_static(PERMISSIONS)),
        ],
    }
}

fn content_security_policy(nonce: &Nonce, env: Environment) -> String {
    let dev = env.is_development();
    let nonce_source = format!("'nonce-{}'", nonce);

    let mut script_src = vec!["'self'", nonce_source.as_str()];
    let mut style_src = vec!["'self'", nonce_source.as_str()];
    let mut connect_src = vec!["'self'"];
    if dev {
        script_src.extend(["'unsafe-eval'", "'unsafe-inline'"]);
        style_src.push("'unsafe-inline'");
        connect_src.extend(["ws:", "wss:"]);
    }

    let mut directives = vec![
        "default-src 'self'".to_string(),
        format!("script-src {}", script_src.join(" ")),
        format!("style-src {}", style_src.join(" ")),
        "img-src 'self' data: blob: https:".to_string(),
        "font-src 'self' data:".to_string(),
        format!("connect-src {}", connect_src.join(" ")),
        "object-src 'none'".to_string(),
        "base-uri 'self'".to_string(),
        "form-action 'self'".to_string(),
        "frame-ancestors 'none'".to_string(),
    ];
    if !dev {
        directives.push("upgrade-insecure-requests".to_string());
    }
    directives.join("; ")
}
