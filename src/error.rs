//! Error type shared by every backend. The panel does not distinguish between
//! failure kinds beyond "the operation failed" plus a readable message; the
//! variants exist so the message can be built from whatever layer failed and
//! so an expired session can send the user back to the login view.

use thiserror::Error;

/// Result alias used by the backend layer.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[derive(Debug, Error)]
pub enum BackendError {
    /// The service answered with an error body; `message` is what it said.
    #[error("{message}")]
    Remote { message: String },

    /// No session, or the service rejected the session token.
    #[error("Not signed in.")]
    Unauthenticated,

    #[error("{0} not found.")]
    NotFound(String),

    /// A business rule refused the operation before anything was written.
    #[error("{0}")]
    Rejected(String),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Unexpected response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Session file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BackendError {
    pub fn remote(message: impl Into<String>) -> Self {
        BackendError::Remote {
            message: message.into(),
        }
    }

    /// Whether the failure means the user has to log in again.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, BackendError::Unauthenticated)
    }
}
