//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Document not found.
    #[error("document not found: {0}")]
    NotFound(String),

    /// Revision mismatch on write.
    #[error("document update conflict: {0}")]
    Conflict(String),

    /// Malformed document.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The database has been destroyed.
    #[error("database destroyed: {0}")]
    Destroyed(String),

    /// The database is unreachable.
    #[error("database offline: {0}")]
    Offline(String),

    /// The write was rejected by the database's access rules.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A stream channel was closed.
    #[error("channel closed")]
    ChannelClosed,
}

impl From<relsync_types::Error> for StorageError {
    fn from(e: relsync_types::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
