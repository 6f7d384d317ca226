//! Error types for the adapter.

use relsync_model::ModelError;
use relsync_storage::StorageError;
use relsync_sync::SyncError;
use thiserror::Error;

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Errors returned by adapter operations.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The adapter or a model is misconfigured.
    #[error("{0}")]
    Configuration(String),

    /// A single-record lookup found nothing.
    #[error("Not found: type \"{record_type}\" with id \"{id}\"")]
    NotFound { record_type: String, id: String },

    #[error("{0}")]
    UnsupportedOperation(String),

    #[error("model error: {0}")]
    Model(ModelError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
}

impl From<ModelError> for AdapterError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::Configuration(message) => Self::Configuration(message),
            other => Self::Model(other),
        }
    }
}
