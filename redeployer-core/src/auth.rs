//! Deploy token authentication
//!
//! Derives a hash from the presented token with the configured scrypt key and
//! compares it against the expected hash. No lockout, rate limiting or replay
//! protection.

use thiserror::Error;
use tracing::{debug, error};

use crate::key::ScryptKey;

/// Authentication failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Token missing or does not match
    #[error("Unauthorized")]
    Unauthorized,

    /// The derivation itself failed; the token was never compared
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Verifies deploy tokens against one configured key
#[derive(Debug, Clone)]
pub struct Authenticator {
    key: ScryptKey,
}

impl Authenticator {
    /// Creates an authenticator for a key that already has its salt attached
    pub fn new(key: ScryptKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &ScryptKey {
        &self.key
    }

    /// Checks a presented token
    ///
    /// Blocks for the duration of one scrypt derivation; async callers should
    /// run this on a blocking thread.
    pub fn authenticate(&self, token: Option<&str>) -> Result<(), AuthError> {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            debug!("No deploy token presented");
            return Err(AuthError::Unauthorized);
        };

        let derived = self.key.derive(token).map_err(|e| {
            error!("Failed to derive token hash: {}", e);
            AuthError::Internal(e.to_string())
        })?;

        if !hashes_equal(derived.as_bytes(), self.key.hash().as_bytes()) {
            debug!("Deploy token hash mismatch");
            return Err(AuthError::Unauthorized);
        }

        Ok(())
    }
}

fn hashes_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
