//! Error types for the backend API client.
//!
//! # Design
//! Each variant marks where a call stopped: before a response existed
//! (`Transport`), at the status line (`HttpStatus`), or at the body
//! (`Parse`). The remaining variants cover inputs that never reached the
//! wire. Callers branch on the variant rather than on message text.

use thiserror::Error;

/// Errors returned by `ApiClient` operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not be sent or no response came back
    /// (connection refused, DNS failure, TLS failure, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a status outside 200-299.
    #[error("API Error: {status} {status_text}")]
    HttpStatus { status: u16, status_text: String },

    /// A success status arrived but the body is not JSON.
    #[error("failed to parse response body: {0}")]
    Parse(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A header value or method cannot be expressed on the wire.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ApiError {
    /// HTTP status code, if the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport(_))
    }
}
