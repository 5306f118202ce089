//! Sync error types.

use docsync_crypto::CryptoError;
use docsync_storage::StorageError;
use thiserror::Error;

/// Result type for replication and backup operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in replication, scheduling and backups.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Remote unreachable or credentials rejected.
    #[error("remote connection failed: {0}")]
    Connection(String),

    #[error("unit {0} has no enabled remote")]
    NotLinked(String),

    /// Raised by replication helpers; always caught and logged.
    #[error("replication failed: {0}")]
    Replication(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("git error: {0}")]
    Git(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("content provider error: {0}")]
    Content(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for SyncError {
    fn from(e: rusqlite::Error) -> Self {
        SyncError::Database(e.to_string())
    }
}

impl SyncError {
    /// Maps storage connectivity failures onto [`SyncError::Connection`].
    pub fn from_connect(e: StorageError) -> Self {
        match e {
            StorageError::Connection(msg) => SyncError::Connection(msg),
            StorageError::Timeout(secs) => {
                SyncError::Connection(format!("timed out after {secs}s"))
            }
            other => SyncError::Connection(other.to_string()),
        }
    }
}
