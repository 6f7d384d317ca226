//! Replication coordination for relsync.
//!
//! Keeps a host framework's record cache consistent with a local document
//! store that replicates in both directions with a remote.
//!
//! # Architecture
//!
//! - [`ReplicationCoordinator`]: owns the outbound and inbound replication
//!   streams plus an optional change listener, with start/stop/teardown
//! - [`ReplicationPhase`]: per-direction lifecycle state, observable through
//!   `tokio::sync::watch`
//! - [`EventBus`]: named lifecycle events ([`EventKind`]) for subscribers
//! - [`RecordCache`]: what the coordinator needs from the record cache
//!
//! ## Inbound changes
//!
//! 1. Each changed document id is split into `(type, id)`; non-relational
//!    documents are ignored
//! 2. Deleted records still loaded in the cache are unloaded
//! 3. Other records are reloaded in the background; failures are logged
//!
//! Outbound changes have no cache side effects.

mod cache;
mod coordinator;
mod error;
mod events;
mod phase;

pub use cache::{CacheError, CachedRecord, RecordCache};
pub use coordinator::ReplicationCoordinator;
pub use error::{SyncError, SyncResult};
pub use events::{AdapterEvent, EventBus, EventKind, Listener, SubscriptionId};
pub use phase::ReplicationPhase;
