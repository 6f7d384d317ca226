//! Record framework type metadata.

use relsync_types::inflect::camelize;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Attribute every persisted model must declare to carry the revision marker.
pub const REVISION_ATTRIBUTE: &str = "rev";

/// The kind of a relationship declared on a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipKind {
    BelongsTo,
    HasMany,
    /// Any other relationship flavor. Not mapped into the relational schema.
    Other(String),
}

/// How a relationship refers to its related model.
#[derive(Debug, Clone)]
pub enum RelationTarget {
    /// Resolved through [`ModelRegistry::model_for`].
    Name(String),
    /// A direct reference to the related model.
    Model(Arc<ModelType>),
}

/// A relationship declared on a model.
#[derive(Debug, Clone)]
pub struct Relationship {
    /// Attribute key holding the relationship (e.g. `author`, `comments`).
    pub key: String,
    pub kind: RelationshipKind,
    pub target: RelationTarget,
    /// Relationship options, passed through to the store verbatim.
    pub options: Map<String, Value>,
}

/// Type metadata for one record type.
#[derive(Debug, Clone)]
pub struct ModelType {
    /// Model name as known to the record framework (e.g. `blog-post`).
    pub model_name: String,
    /// Declared attribute names.
    pub attributes: BTreeSet<String>,
    /// Declared relationships, in declaration order.
    pub relationships: Vec<Relationship>,
    /// Optional document type override stored in the schema.
    pub document_type: Option<String>,
}

impl ModelType {
    /// Creates a model with no attributes or relationships.
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            attributes: BTreeSet::new(),
            relationships: Vec::new(),
            document_type: None,
        }
    }

    /// Creates a model that already declares the revision attribute.
    pub fn versioned(model_name: impl Into<String>) -> Self {
        Self::new(model_name).attribute(REVISION_ATTRIBUTE)
    }

    /// Declares an attribute.
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.insert(name.into());
        self
    }

    /// Declares a belongs-to relationship resolved by model name.
    pub fn belongs_to(self, key: impl Into<String>, model_name: impl Into<String>) -> Self {
        self.relationship(
            key,
            RelationshipKind::BelongsTo,
            RelationTarget::Name(model_name.into()),
        )
    }

    /// Declares a has-many relationship resolved by model name.
    pub fn has_many(self, key: impl Into<String>, model_name: impl Into<String>) -> Self {
        self.relationship(
            key,
            RelationshipKind::HasMany,
            RelationTarget::Name(model_name.into()),
        )
    }

    /// Declares an arbitrary relationship.
    pub fn relationship(
        mut self,
        key: impl Into<String>,
        kind: RelationshipKind,
        target: RelationTarget,
    ) -> Self {
        self.relationships.push(Relationship {
            key: key.into(),
            kind,
            target,
            options: Map::new(),
        });
        self
    }

    /// Sets options on the most recently declared relationship.
    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        if let Some(rel) = self.relationships.last_mut() {
            rel.options = options;
        }
        self
    }

    /// Sets the document type override.
    pub fn with_document_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_type = Some(document_type.into());
        self
    }

    /// Whether the model declares the given attribute.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains(name)
    }

    /// The name used as the document-ID prefix and singular schema name.
    pub fn record_type_name(&self) -> String {
        camelize(&self.model_name)
    }
}

/// Looks up model metadata by model name.
pub trait ModelRegistry: Send + Sync {
    /// Returns the model registered under `model_name`.
    fn model_for(&self, model_name: &str) -> Option<Arc<ModelType>>;
}

/// A [`ModelRegistry`] backed by a map.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: HashMap<String, Arc<ModelType>>,
}

impl ModelCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a model, replacing any model with the same name.
    pub fn insert(&mut self, model: ModelType) -> Arc<ModelType> {
        let model = Arc::new(model);
        self.models.insert(model.model_name.clone(), model.clone());
        model
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, model: ModelType) -> Self {
        self.insert(model);
        self
    }

    /// Number of models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl ModelRegistry for ModelCatalog {
    fn model_for(&self, model_name: &str) -> Option<Arc<ModelType>> {
        self.models.get(model_name).cloned()
    }
}
