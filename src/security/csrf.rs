//! CSRF token issuance.
//!
//! Tokens are placed twice: in an HttpOnly, SameSite=Strict cookie and in a
//! response header the client copies into form submissions. Verification of
//! the double submit belongs to the form handler, not to this module.

use std::sync::Arc;

use axum::http::{header::SET_COOKIE, HeaderMap, HeaderName, HeaderValue};

use crate::config::{CsrfConfig, Environment};
use crate::security::nonce::{NonceGenerator, TOKEN_BYTES};

/// Cookie attributes attached to an issued token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieAttributes {
    pub name: String,
    pub path: &'static str,
    pub max_age_secs: u64,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: &'static str,
}

/// An issued anti-forgery token.
#[derive(Debug, Clone)]
pub struct CsrfToken {
    value: String,
    cookie: CookieAttributes,
}

impl CsrfToken {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn cookie(&self) -> &CookieAttributes {
        &self.cookie
    }

    /// Render the `Set-Cookie` header value.
    pub fn set_cookie_value(&self) -> String {
        let c = &self.cookie;
        let mut cookie = format!(
            "{}={}; Path={}; Max-Age={}",
            c.name, self.value, c.path, c.max_age_secs
        );
        if c.http_only {
            cookie.push_str("; HttpOnly");
        }
        cookie.push_str("; SameSite=");
        cookie.push_str(c.same_site);
        if c.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Issues CSRF tokens for page routes.
#[derive(Debug)]
pub struct CsrfTokenIssuer {
    generator: Arc<NonceGenerator>,
    cookie_name: String,
    header_name: HeaderName,
    max_age_secs: u64,
    secure: bool,
}

impl CsrfTokenIssuer {
    pub fn new(config: &CsrfConfig, environment: Environment, generator: Arc<NonceGenerator>) -> Self {
        let header_name = HeaderName::try_from(config.header_name.as_str()).unwrap_or_else(|_| {
            tracing::warn!(header = %config.header_name, "Invalid CSRF header name, using x-csrf-token");
            HeaderName::from_static("x-csrf-token")
        });
        Self {
            generator,
            cookie_name: config.cookie_name.clone(),
            header_name,
            max_age_secs: config.max_age_secs,
            secure: environment.is_production(),
        }
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.header_name
    }

    pub fn issue(&self) -> CsrfToken {
        CsrfToken {
            value: self.generator.random_token(TOKEN_BYTES),
            cookie: CookieAttributes {
                name: self.cookie_name.clone(),
                path: "/",
                max_age_secs: self.max_age_secs,
                http_only: true,
                secure: self.secure,
                same_site: "Strict",
            },
        }
    }

    /// Write the cookie and the mirrored header.
    pub fn apply(&self, token: &CsrfToken, headers: &mut HeaderMap) {
        if let Ok(cookie) = HeaderValue::from_str(&token.set_cookie_value()) {
            headers.append(SET_COOKIE, cookie);
        }
        if let Ok(value) = HeaderValue::from_str(token.value()) {
            headers.insert(self.header_name.clone(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer(env: Environment) -> CsrfTokenIssuer {
        CsrfTokenIssuer::new(&CsrfConfig::default(), env, Arc::new(NonceGenerator::new()))
    }

    #[test]
    fn test_production_cookie_attributes() {
        let token = issuer(Environment::Production).issue();
        let cookie = token.set_cookie_value();
        assert!(cookie.starts_with(&format!("csrf-token={}", token.value())));
        assert!(cookie.contains("; HttpOnly"));
        assert!(cookie.contains("; SameSite=Strict"));
        assert!(cookie.contains("; Max-Age=86400"));
        assert!(cookie.contains("; Path=/"));
        assert!(cookie.ends_with("; Secure"));
    }

    #[test]
    fn test_development_cookie_is_not_secure() {
        let token = issuer(Environment::Development).issue();
        assert!(!token.cookie().secure);
        assert!(!token.set_cookie_value().contains("Secure"));
    }

    #[test]
    fn test_tokens_are_unique() {
        let issuer = issuer(Environment::Production);
        let a = issuer.issue();
        let b = issuer.issue();
        assert_ne!(a.value(), b.value());
        assert_eq!(a.value().len(), 43);
    }

    #[test]
    fn test_apply_mirrors_header() {
        let issuer = issuer(Environment::Production);
        let token = issuer.issue();
        let mut headers = HeaderMap::new();
        issuer.apply(&token, &mut headers);
        assert_eq!(headers["x-csrf-token"], token.value());
        assert_eq!(headers[SET_COOKIE], token.set_cookie_value().as_str());
    }
}
