use thiserror::Error;

/// Failures of a single control request. Every variant is reported to the
/// client through the response envelope; none of them stops the server.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("malformed request body: {0}")]
    MalformedBody(String),

    #[error("{0} must not be empty")]
    MissingField(&'static str),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("{0}")]
    InvalidMethod(String),

    #[error("invalid {field} address: {reason}")]
    InvalidUri { field: &'static str, reason: String },

    #[error("content is not a valid playlist description: {0}")]
    BadContent(String),

    #[error("{0}")]
    Callback(String),

    #[error("callback panicked: {0}")]
    CallbackPanic(String),

    #[error("control server is not configured")]
    NotConfigured,

    #[error("control server is already configured")]
    AlreadyConfigured,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RequestError {
    /// Stable non-zero envelope code for this failure kind.
    pub fn code(&self) -> i32 {
        match self {
            Self::MalformedBody(_) => -1,
            Self::MissingField(_)
            | Self::InvalidField { .. }
            | Self::InvalidMethod(_)
            | Self::BadContent(_) => -2,
            Self::InvalidUri { .. } => -3,
            Self::Callback(_) | Self::CallbackPanic(_) => -4,
            Self::NotConfigured | Self::AlreadyConfigured | Self::Io(_) => -5,
        }
    }
}
