//! Record-store adapter for relsync.
//!
//! [`Adapter`] translates record operations (find, create, update, delete)
//! into relational calls on a [`relsync_storage::DocumentStore`], registering
//! each model's relational schema on first use. When a remote is configured
//! it also drives two-way replication through a
//! [`relsync_sync::ReplicationCoordinator`] and republishes lifecycle events
//! on [`Adapter::events`].
//!
//! ```ignore
//! let adapter = Adapter::builder(Arc::new(catalog))
//!     .db(Arc::new(local))
//!     .remote(Arc::new(remote), cache)
//!     .build();
//! adapter.start_default_replication().await?;
//! ```

mod adapter;
mod config;
mod error;
mod logging;

pub use adapter::{Adapter, AdapterBuilder};
pub use config::{AdapterConfig, ReloadPolicy};
pub use error::{AdapterError, AdapterResult};
pub use logging::{init_logging, LOG_ENV};
