use std::sync::Arc;

use reqwest::StatusCode;

pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// Errors raised while resolving keys and decrypting segment streams.
#[derive(Debug, thiserror::Error, Clone)]
pub enum CoreError {
    /// Missing or malformed key material. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network failure or deadline expiry while fetching a key or resolving a URI.
    #[error("Fetch failed: {message}")]
    Fetch {
        message: String,
        status: Option<StatusCode>,
    },

    /// The remote key endpoint answered, but with no data.
    #[error("Key not found, no data returned from {url} (status {status})")]
    NotFound { url: String, status: StatusCode },

    /// Ciphertext could not be decrypted.
    #[error("Decode failed: {0}")]
    Decode(String),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid pipeline state: {0}")]
    InvalidState(String),

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: Arc<std::io::Error>,
    },
}

impl CoreError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch {
            message: msg.into(),
            status: None,
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// True when the caller asked to stop, as opposed to the operation giving up.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Errors a download engine should not retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Decode(_) | Self::InvalidState(_) | Self::InvalidUrl(_)
        )
    }

    /// Remote status preserved for diagnostics, if the failure came from an HTTP response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Fetch { status, .. } => *status,
            Self::NotFound { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// Manual implementation because of the Arc wrapping.
impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Io {
            source: Arc::new(err),
        }
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        CoreError::Fetch {
            status: err.status(),
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for CoreError {
    fn from(err: url::ParseError) -> Self {
        CoreError::InvalidUrl(err.to_string())
    }
}
