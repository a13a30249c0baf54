//! Error types for the hotel session client.
//!
//! Uses `thiserror` for structured error handling with automatic `From` implementations.

use std::time::Duration;

/// Errors from a refresh round-trip.
///
/// Cloneable so that every caller joined to one in-flight refresh receives
/// the same outcome.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// Connection, DNS, TLS or body transfer failure.
    #[error("refresh transport error: {0}")]
    Transport(String),

    /// The refresh endpoint did not answer in time.
    #[error("refresh timed out after {0:?}")]
    Timeout(Duration),

    /// Non-2xx response from the refresh endpoint.
    #[error("refresh rejected ({status}): {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or message
        message: String,
    },

    /// Response body was not the expected JSON shape.
    #[error("invalid refresh response: {0}")]
    InvalidBody(String),

    /// Response carried no access token.
    #[error("refresh response did not contain an access token")]
    MissingToken,
}

impl RefreshError {
    /// Map a reqwest failure, keeping timeouts distinct.
    pub(crate) fn from_reqwest(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_decode() {
            Self::InvalidBody(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Errors from the durable key/value store.
///
/// The token store swallows these; they surface only through logs and the
/// failure counter.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    /// Filesystem failure.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file is not valid JSON.
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage is disabled or otherwise not usable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the authenticated request dispatcher.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// HTTP transport error (connection, DNS, TLS, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Middleware error
    #[error("Middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    /// Request timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Endpoint could not be turned into a URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON encoding or decoding error
    #[error("Failed to process JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Non-2xx response
    #[error("{message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Server-provided message, or `HTTP <status>`
        message: String,
    },

    /// The session is gone and the user must log in again.
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed {
        /// What ended the session
        reason: String,
    },
}

impl ClientError {
    /// Create a status error.
    #[must_use]
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status { status, message: message.into() }
    }

    /// Create an authentication failure.
    #[must_use]
    pub fn auth_failed(reason: impl Into<String>) -> Self {
        Self::AuthenticationFailed { reason: reason.into() }
    }

    /// Returns true when the caller should send the user back to login.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }

    /// HTTP status code, if the server answered.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type alias for dispatcher operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type alias for refresh operations.
pub type RefreshResult<T> = Result<T, RefreshError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
