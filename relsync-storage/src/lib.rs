//! Document store facade for relsync.
//!
//! Defines what the adapter needs from a local-first document database and
//! ships an in-process implementation of it.
//!
//! # Architecture
//!
//! - [`DocumentStore`]: relational CRUD (find/save/delete keyed by record
//!   type), schema registration, destruction, and directional replication
//!   against a [`RemoteDatabase`]
//! - [`RemoteDatabase`]: the capabilities replication needs from the other
//!   side (a live change feed and revision-preserving bulk writes)
//! - [`ReplicationStream`] / [`ChangeFeed`]: long-lived, cancellable event
//!   streams. They are not single-shot futures: each delivers many events
//!   over an mpsc channel until it completes or is canceled
//! - [`MemoryStore`]: implements both traits in memory, including live
//!   replication with retry, so two instances can sync with each other

mod changes;
mod error;
mod memory;
mod payload;
mod replication;
mod store;
mod stream;

pub use changes::{ChangeFeed, ChangesEvent, ChangesInfo, ChangesOptions, Since};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use payload::{DeleteResult, FindQuery, RelationalPayload};
pub use replication::{
    ChangeBatch, Direction, ReplicationEvent, ReplicationInfo, ReplicationOptions,
    ReplicationStream, StreamError,
};
pub use store::{DocumentStore, RemoteDatabase, WriteOutcome};
pub use stream::{CancelHandle, StreamEmitter, StreamHandle};
