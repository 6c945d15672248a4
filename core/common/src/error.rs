//! Common error types for PinSync.

use thiserror::Error;

/// Top-level error type for PinSync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Network or HTTP failure talking to the remote event source.
    #[error("Network error: {0}")]
    Network(String),

    /// The remote rejected our credentials.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A remote envelope or response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Local store insert, delete or commit failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration is missing or inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying the whole operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Io(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
