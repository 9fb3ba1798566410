//! Error types for gateway, catalog and identity-provider operations

use opcmap_core::CoreError;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur during client operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// Caller-side validation failed; nothing was sent
    #[error("Validation error: {0}")]
    Validation(String),

    /// Server answered with HTTP status >= 400
    #[error("HTTP {status}: {body}")]
    Transport { status: u16, body: String },

    /// HTTP request failed before a status was received
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Identity provider rejected the login flow
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Envelope reported failure or lacked a mandatory field
    #[error("{0}")]
    Protocol(String),

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    Parse(String),
}

impl ClientError {
    /// Create a transport error from status code and raw body
    pub fn transport(status: u16, body: impl Into<String>) -> Self {
        Self::Transport {
            status,
            body: body.into(),
        }
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Transport { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// 401/410-class failure that a token refresh may cure
    pub fn is_auth_expired(&self) -> bool {
        matches!(self.status(), Some(401) | Some(410))
    }

    /// 5xx failure, retried on the concurrent paging path
    pub fn is_server_error(&self) -> bool {
        matches!(self.status(), Some(500..=599))
    }
}

impl From<CoreError> for ClientError {
    fn from(err: CoreError) -> Self {
        ClientError::Validation(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Parse(err.to_string())
    }
}
