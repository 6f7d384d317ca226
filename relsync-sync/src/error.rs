//! Error types for the sync layer.

use relsync_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
///
/// Failures of a running stream are not errors here: they are published as
/// events on the [`EventBus`](crate::EventBus).
#[derive(Debug, Error)]
pub enum SyncError {
    /// A session of this kind is already running.
    #[error("{0} is already running")]
    AlreadyRunning(&'static str),

    /// Opening a stream failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
