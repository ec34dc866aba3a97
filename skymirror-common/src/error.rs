//! Common error types for skymirror

use thiserror::Error;

/// Common result type for skymirror operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across skymirror services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport or status error (wraps reqwest::Error)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration loading or validation error, fatal at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persisted state is unreadable; requires operator intervention
    #[error("State store corrupt: {0}")]
    StateCorrupt(String),

    /// Retryable failure reported by an external collaborator
    #[error("Transient error: {0}")]
    Transient(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error is worth retrying.
    ///
    /// Connectivity failures and server-side (5xx) responses are transient;
    /// auth/permission failures and everything else are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transient(_) => true,
            Error::Http(e) => {
                // An HTTP error without a status code is a transport-level
                // failure (connect, timeout, broken body) and may clear up.
                e.status().map_or(true, |s| s.is_server_error())
            }
            _ => false,
        }
    }
}
