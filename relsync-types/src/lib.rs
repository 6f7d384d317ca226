//! Core type definitions for relsync.
//!
//! This crate defines the store-agnostic value types shared by every other
//! crate in the workspace:
//! - Record keys and the relational document-ID convention (`{type}_{id}`)
//! - Revision markers used for optimistic concurrency
//! - Flat record documents and document change notifications
//! - Model-name inflection (camelize, classify, pluralize)

mod document;
mod ids;
pub mod inflect;
mod revision;

pub use document::{DocumentChange, RecordDocument, ID_FIELD, REV_FIELD};
pub use ids::{format_doc_id, generate_record_id, ParsedDocId, RecordKey, DOC_ID_SEPARATOR};
pub use revision::Revision;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid revision: {0}")]
    InvalidRevision(String),
}
