//! Storage error types.

use thiserror::Error;

/// Result type for persistor operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by persistors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {location}/{key}")]
    NotFound { location: String, key: String },

    #[error("read failed for {key}: {message}")]
    Read { key: String, message: String },

    #[error("write failed for {key}: {message}")]
    Write { key: String, message: String },

    #[error("remote unreachable: {0}")]
    Connection(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid persistor configuration: {0}")]
    Config(String),
}

impl StorageError {
    pub fn not_found(location: &str, key: &str) -> Self {
        Self::NotFound {
            location: location.to_string(),
            key: key.to_string(),
        }
    }

    pub fn read(key: &str, message: impl ToString) -> Self {
        Self::Read {
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    pub fn write(key: &str, message: impl ToString) -> Self {
        Self::Write {
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
