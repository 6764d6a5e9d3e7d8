//! Framework error types

use thiserror::Error;

/// Errors that can occur in the assistant
#[derive(Error, Debug)]
pub enum FrameworkError {
    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Channel closed unexpectedly
    #[error("Channel closed")]
    ChannelClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Tool input failed validation
    #[error("InputValidationError: {0}")]
    Validation(String),

    /// Error returned by the model API
    #[error("API error: {0}")]
    Api(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The operation was cancelled by the user
    #[error("Request was aborted")]
    Aborted,

    /// Agent shutdown requested
    #[error("Agent shutdown")]
    Shutdown,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl FrameworkError {
    /// Create a generic error from a string
    pub fn other(msg: impl Into<String>) -> Self {
        FrameworkError::Other(msg.into())
    }

    /// Whether this error represents a user cancellation
    pub fn is_aborted(&self) -> bool {
        matches!(self, FrameworkError::Aborted)
    }
}

impl From<anyhow::Error> for FrameworkError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<FrameworkError>() {
            Ok(inner) => inner,
            Err(err) => FrameworkError::Other(format!("{:#}", err)),
        }
    }
}

/// Result type alias for framework operations
pub type FrameworkResult<T> = Result<T, FrameworkError>;
