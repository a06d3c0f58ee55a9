//! Per-request random tokens.
//!
//! Nonces (128 bits) and CSRF tokens (256 bits) come from the OS CSPRNG and
//! are encoded base64url without padding. If the OS source fails the
//! generator falls back to `fastrand`, which keeps the pipeline serving but
//! is recorded as a security event.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};

use crate::observability::metrics;

/// Bytes of entropy in a CSP nonce.
pub const NONCE_BYTES: usize = 16;

/// Bytes of entropy in a CSRF token.
pub const TOKEN_BYTES: usize = 32;

/// A source of secure random bytes.
pub trait EntropySource: Send + Sync {
    fn try_fill(&self, dest: &mut [u8]) -> Result<(), rand::Error>;
}

/// The platform CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn try_fill(&self, dest: &mut [u8]) -> Result<(), rand::Error> {
        OsRng.try_fill_bytes(dest)
    }
}

/// A CSP nonce value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Nonce(String);

impl Nonce {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generates nonces and opaque tokens.
pub struct NonceGenerator {
    source: Box<dyn EntropySource>,
    fallbacks: AtomicU64,
}

impl NonceGenerator {
    pub fn new() -> Self {
        Self::with_source(OsEntropy)
    }

    pub fn with_source(source: impl EntropySource + 'static) -> Self {
        Self {
            source: Box::new(source),
            fallbacks: AtomicU64::new(0),
        }
    }

    /// Issue a fresh CSP nonce.
    pub fn generate(&self) -> Nonce {
        Nonce(self.random_token(NONCE_BYTES))
    }

    /// Encode `len` random bytes as base64url.
    pub fn random_token(&self, len: usize) -> String {
        let mut buf = vec![0u8; len];
        if let Err(e) = self.source.try_fill(&mut buf) {
            self.fallbacks.fetch_add(1, Ordering::Relaxed);
            metrics::record_entropy_fallback();
            tracing::warn!(
                security_event = "entropy_fallback",
                error = %e,
                "Secure random source unavailable, using fallback generator"
            );
            fastrand::fill(&mut buf);
        }
        URL_SAFE_NO_PAD.encode(&buf)
    }

    /// Number of tokens produced by the fallback generator.
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }
}

impl Default for NonceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NonceGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonceGenerator")
            .field("fallbacks", &self.fallback_count())
            .finish()
    }
}
