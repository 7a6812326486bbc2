//! # Session Errors
//!
//! Error types for the session store.

use thiserror::Error;

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Session store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    // ==================
    // Logical Errors
    // ==================

    /// Session key does not exist (expired or never created)
    #[error("Session key not found")]
    KeyNotFound,

    /// Session exists but the requested field is absent
    #[error("Suffixed key not found")]
    SuffixNotFound,

    // ==================
    // Confirmation Errors
    // ==================

    /// The operation could not be confirmed as applied
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    // ==================
    // Lower Layer Errors
    // ==================

    /// Connection or protocol failure from the store
    #[error("Transport error: {0}")]
    Transport(String),

    /// Stored bytes could not be decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// Client configuration is invalid
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SessionError {
    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::KeyNotFound => "SESSION_KEY_NOT_FOUND",
            SessionError::SuffixNotFound => "SESSION_SUFFIX_NOT_FOUND",
            SessionError::OperationFailed(_) => "SESSION_OPERATION_FAILED",
            SessionError::Transport(_) => "SESSION_TRANSPORT",
            SessionError::Codec(_) => "SESSION_CODEC",
            SessionError::Config(_) => "SESSION_CONFIG",
        }
    }

    /// Returns whether the error is a logical precondition failure
    ///
    /// These never change on retry.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::KeyNotFound | SessionError::SuffixNotFound)
    }

    pub(crate) fn retries_exhausted(attempts: u32) -> Self {
        SessionError::OperationFailed(format!(
            "optimistic commit conflicted on all {} attempts",
            attempts
        ))
    }

    pub(crate) fn refresh_missed() -> Self {
        SessionError::OperationFailed("expiration refresh touched no key".to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Codec(e.to_string())
    }
}

impl From<base64::DecodeError> for SessionError {
    fn from(e: base64::DecodeError) -> Self {
        SessionError::Codec(format!("invalid payload encoding: {}", e))
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for SessionError {
    fn from(e: redis::RedisError) -> Self {
        SessionError::Transport(e.to_string())
    }
}
