//! Error types for sftp-ingest
//!
//! Errors fall into two groups:
//! - Per-file failures (transport, not-found, permission) which the pipeline
//!   converts into a terminal `error` outcome for that file
//! - Run-level failures (connection, storage, configuration) which abort the
//!   batch and are surfaced to the caller

use thiserror::Error;

/// Result type alias for sftp-ingest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sftp-ingest
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "remote.host")
        key: Option<String>,
    },

    /// Could not establish or authenticate the remote session
    #[error("connection error: {0}")]
    Connection(String),

    /// Remote list/fetch failed in a way that may succeed on retry
    #[error("transport error: {0}")]
    Transport(String),

    /// Remote path does not exist
    #[error("remote path not found: {0}")]
    NotFound(String),

    /// Remote server refused access to the path
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Persisting an outcome failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Notification dispatch failed
    #[error("notification error: {0}")]
    Notification(String),

    /// The run was cancelled before the operation could start
    #[error("operation cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error for the given key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Whether this error must abort the whole batch rather than a single file
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config { .. }
                | Error::Connection(_)
                | Error::Storage(_)
                | Error::Sqlx(_)
        )
    }
}

/// Durable store and validation log errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to open the database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Appending to the validation log failed
    #[error("failed to write validation log: {0}")]
    LogWriteFailed(String),

    /// Every attempt to record an outcome failed
    #[error("failed to record outcome for {filename} after {attempts} attempts: {reason}")]
    RecordFailed {
        /// File whose outcome could not be persisted
        filename: String,
        /// Number of attempts made
        attempts: u32,
        /// Last failure
        reason: String,
    },
}

/// A validator could not process the content
///
/// The pipeline turns this into an `invalid` outcome carrying the message.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ValidationFailure(pub String);

impl ValidationFailure {
    /// Create a failure with the given message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
