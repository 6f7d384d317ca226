use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One relational schema entry, as pushed to the document store.
///
/// Serializes to the shape the relational mapping layer expects:
/// `{"singular": "post", "plural": "posts", "relations": {"author": {"belongsTo": {"type": "author", "options": {}}}}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDefinition {
    pub singular: String,
    pub plural: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relations: Option<BTreeMap<String, RelationDescriptor>>,
}

impl SchemaDefinition {
    /// Returns the relation declared under `key`.
    pub fn relation(&self, key: &str) -> Option<&RelationDescriptor> {
        self.relations.as_ref().and_then(|r| r.get(key))
    }
}

/// A relation from one schema entry to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationDescriptor {
    BelongsTo {
        #[serde(rename = "type")]
        related_type: String,
        #[serde(default)]
        options: Map<String, Value>,
    },
    HasMany {
        #[serde(rename = "type")]
        related_type: String,
        #[serde(default)]
        options: Map<String, Value>,
    },
}

impl RelationDescriptor {
    /// Singular name of the related type.
    pub fn related_type(&self) -> &str {
        match self {
            Self::BelongsTo { related_type, .. } | Self::HasMany { related_type, .. } => {
                related_type
            }
        }
    }

    /// Relationship options.
    pub fn options(&self) -> &Map<String, Value> {
        match self {
            Self::BelongsTo { options, .. } | Self::HasMany { options, .. } => options,
        }
    }

    /// Whether this is a belongs-to relation.
    pub fn is_belongs_to(&self) -> bool {
        matches!(self, Self::BelongsTo { .. })
    }
}
