//! Record model metadata and relational schema for relsync.
//!
//! Defines the contract between the record framework and the document store:
//! - [`ModelType`] / [`ModelRegistry`]: the record framework's type metadata
//!   (attributes, relationships, optional document type)
//! - [`SchemaDefinition`]: the relational schema entry pushed to the store
//! - [`SchemaRegistrar`]: derives schema entries by walking relationships,
//!   memoized per adapter instance
//! - [`RecordView`] / [`RecordTranslator`]: flattens a live record or a
//!   snapshot into a [`relsync_types::RecordDocument`]

mod error;
mod model;
mod record;
mod registrar;
mod schema;
mod translator;

pub use error::{ModelError, ModelResult};
pub use model::{
    ModelCatalog, ModelRegistry, ModelType, RelationTarget, Relationship, RelationshipKind,
    REVISION_ATTRIBUTE,
};
pub use record::{LiveRecord, RecordSnapshot, RecordView, SerializedRecord};
pub use registrar::SchemaRegistrar;
pub use schema::{RelationDescriptor, SchemaDefinition};
pub use translator::RecordTranslator;
