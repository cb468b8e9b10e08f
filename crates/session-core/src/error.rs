use thiserror::Error;

/// Errors surfaced by the session layer.
///
/// Every decode or authentication problem is reported as [`SessionError::InvalidSession`]
/// without further detail, so callers cannot tell a malformed blob from a forged one.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no valid session")]
    InvalidSession,

    #[error("secure random source unavailable")]
    Entropy,

    #[error("session sealing failed")]
    Seal,

    #[error("session serialization failed: {0}")]
    Serialization(String),

    #[error("session storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl SessionError {
    pub fn config(message: impl Into<String>) -> Self {
        SessionError::Configuration(message.into())
    }

    /// True for the fatal startup class of errors.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SessionError::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
