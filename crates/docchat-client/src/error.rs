//! Error types for the client library

use thiserror::Error;

/// Client error types
#[derive(Error, Debug)]
pub enum ClientError {
    /// Terminal authentication failure. The credential is invalid and could
    /// not be refreshed; the caller must treat the user as logged out.
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx response that is not an auth failure.
    #[error("backend returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The event stream itself reported a failure or ended prematurely.
    #[error("stream error: {0}")]
    Stream(String),

    /// The turn was cancelled by the caller. Not a failure.
    #[error("turn cancelled")]
    Cancelled,

    /// A turn is already streaming on this session.
    #[error("a chat turn is already in progress")]
    TurnInProgress,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The turn task could not be joined.
    #[error("session error: {0}")]
    Session(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// True when the caller should transition to a logged-out state.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            ClientError::Auth(_) | ClientError::Api { status: 401, .. }
        )
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
