//! Error types for the dripfeed pipeline.

use thiserror::Error;

/// Result type alias using dripfeed's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for dripfeed operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Content drop not found
    #[error("Drop not found: {0}")]
    DropNotFound(uuid::Uuid),

    /// Queue item not found
    #[error("Queue item not found: {0}")]
    QueueItemNotFound(uuid::Uuid),

    /// Content fetch failed
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Queue operation failed
    #[error("Queue error: {0}")]
    Queue(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Operation exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying the failed operation could succeed.
    ///
    /// Transient failures (network, timeouts, backend hiccups, database
    /// errors) are worth another attempt. Malformed input, missing
    /// resources, and bad configuration are not: retrying reproduces the
    /// same failure, so the queue routes them straight to a terminal state.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Database(_)
            | Error::Fetch(_)
            | Error::Embedding(_)
            | Error::Queue(_)
            | Error::Request(_)
            | Error::Timeout(_)
            | Error::Internal(_)
            | Error::Io(_) => true,
            Error::NotFound(_)
            | Error::DropNotFound(_)
            | Error::QueueItemNotFound(_)
            | Error::Serialization(_)
            | Error::Config(_)
            | Error::InvalidInput(_) => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::Request(e.to_string())
        }
    }
}
