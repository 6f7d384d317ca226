//! Document store abstraction.
//!
//! Defines the traits the adapter and the replication coordinator depend on,
//! allowing them to work with any local-first document database.

use crate::changes::{ChangeFeed, ChangesOptions};
use crate::error::StorageResult;
use crate::payload::{DeleteResult, FindQuery, RelationalPayload};
use crate::replication::{ReplicationOptions, ReplicationStream};
use async_trait::async_trait;
use relsync_model::SchemaDefinition;
use relsync_types::{DocumentChange, ParsedDocId, RecordDocument};
use std::sync::Arc;

/// Outcome of writing one replicated revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The revision became the document's current revision.
    Written,
    /// The target already holds this or a newer revision.
    Skipped,
    /// The target's access rules rejected the write.
    Denied(String),
}

/// The capabilities replication needs from either side of a stream.
#[async_trait]
pub trait RemoteDatabase: Send + Sync {
    /// Returns the database name (for logging).
    fn name(&self) -> &str;

    /// Opens a change feed.
    async fn changes(&self, options: ChangesOptions) -> StorageResult<ChangeFeed>;

    /// Writes replicated revisions as-is, without assigning new revisions.
    /// Returns one outcome per input change, in order.
    async fn apply_revisions(&self, changes: Vec<DocumentChange>) -> StorageResult<Vec<WriteOutcome>>;
}

/// A local document database with a relational mapping layer.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns the database name (for logging).
    fn name(&self) -> &str;

    /// Replaces the relational schema. Safe to call repeatedly.
    async fn set_schema(&self, schema: &[SchemaDefinition]) -> StorageResult<()>;

    /// Fetches records of a type.
    async fn find(&self, record_type: &str, query: FindQuery) -> StorageResult<RelationalPayload>;

    /// Creates (no revision) or updates (current revision) a record.
    /// Returns the stored document with its id and new revision.
    async fn save(&self, record_type: &str, doc: RecordDocument) -> StorageResult<RecordDocument>;

    /// Deletes a record. The document must carry its current revision.
    async fn delete(&self, record_type: &str, doc: RecordDocument) -> StorageResult<DeleteResult>;

    /// Destroys the database and everything in it.
    async fn destroy(&self) -> StorageResult<()>;

    /// Starts replicating local changes to `remote`.
    async fn replicate_to(
        &self,
        remote: Arc<dyn RemoteDatabase>,
        options: ReplicationOptions,
    ) -> StorageResult<ReplicationStream>;

    /// Starts replicating changes from `remote` into this store.
    async fn replicate_from(
        &self,
        remote: Arc<dyn RemoteDatabase>,
        options: ReplicationOptions,
    ) -> StorageResult<ReplicationStream>;

    /// Splits a raw document id into record type and id.
    fn parse_doc_id(&self, raw: &str) -> ParsedDocId {
        ParsedDocId::parse(raw)
    }
}
