//! Shared secret resolution.
//!
//! The secret is resolved once from [`SessionConfig`] and then shared read-only
//! (behind an `Arc`) by every codec built from it.

use std::fmt;

use tracing::warn;
use zeroize::Zeroizing;

use crate::config::{Environment, SessionConfig, SECRET_ENV};
use crate::error::{Result, SessionError};

/// Development fallback. Refused when the environment is production.
pub const DEFAULT_SECRET: &str = "darklock-session-insecure-default";

pub struct SharedSecret {
    bytes: Zeroizing<Vec<u8>>,
    is_default: bool,
}

impl SharedSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = Zeroizing::new(bytes.into());
        if bytes.is_empty() {
            return Err(SessionError::config("shared secret is empty"));
        }
        let is_default = bytes.as_slice() == DEFAULT_SECRET.as_bytes();
        Ok(Self { bytes, is_default })
    }

    /// Resolve the configured secret, falling back to [`DEFAULT_SECRET`]
    /// outside production.
    pub fn resolve(config: &SessionConfig) -> Result<Self> {
        let secret = match config.secret.as_deref() {
            Some(value) => Self::new(value.as_bytes())?,
            None => Self::new(DEFAULT_SECRET.as_bytes())?,
        };
        if secret.is_default {
            if config.environment == Environment::Production {
                return Err(SessionError::config(format!(
                    "refusing built-in default session secret in production; set {SECRET_ENV}"
                )));
            }
            warn!("using built-in default session secret; set {SECRET_ENV} before deploying");
        }
        Ok(secret)
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub(crate) fn expose(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}
