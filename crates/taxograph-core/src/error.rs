//! Error types for taxograph.

use thiserror::Error;

/// Result type alias using taxograph's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for taxograph operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed query input (negative depth, too many groups, bad sort key)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Referenced concept or resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Connection to the backing graph store lost or never established
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Resource catalog could not be reached
    #[error("Directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// Resource catalog answered but rejected the request
    #[error("Request error: {0}")]
    Request(String),

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the failure is worth retrying.
    ///
    /// Only connectivity failures qualify; a catalog that answered with a
    /// client error, or a malformed query, will fail the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable(_) | Error::DirectoryUnavailable(_)
        )
    }

    /// Classify a sqlx error at the store boundary.
    pub fn from_store(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => Error::StoreUnavailable(e.to_string()),
            sqlx::Error::RowNotFound => Error::NotFound("row not found".to_string()),
            other => Error::Database(other),
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
        if e.is_connect() || e.is_timeout() {
            return Error::DirectoryUnavailable(e.to_string());
        }
        match e.status() {
            Some(status) if status.is_server_error() => Error::DirectoryUnavailable(e.to_string()),
            Some(_) => Error::Request(e.to_string()),
            None if e.is_decode() => Error::Serialization(e.to_string()),
            None => Error::DirectoryUnavailable(e.to_string()),
        }
    }
}
