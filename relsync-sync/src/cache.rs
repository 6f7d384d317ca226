//! The record cache contract.
//!
//! The coordinator keeps the host framework's in-memory record cache
//! consistent with inbound replication through this trait. The cache is
//! shared and its operations are assumed idempotent.

use async_trait::async_trait;
use relsync_types::RecordKey;
use thiserror::Error;

/// What the cache knows about a loaded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CachedRecord {
    /// The record was deleted locally but may still sit in the cache.
    pub is_deleted: bool,
}

/// A failed reload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("record not found: {0}")]
    NotFound(RecordKey),

    #[error("reload failed for {key}: {reason}")]
    Reload { key: RecordKey, reason: String },
}

/// The record framework's identity map, as seen by the coordinator.
#[async_trait]
pub trait RecordCache: Send + Sync {
    /// Looks up a record without loading it.
    fn peek(&self, key: &RecordKey) -> Option<CachedRecord>;

    /// Evicts a record.
    fn unload(&self, key: &RecordKey);

    /// Fetches the record, or refreshes it if already loaded.
    async fn find_record(&self, key: &RecordKey) -> Result<(), CacheError>;
}
