//! Record identity and the relational document-ID convention.
//!
//! Every relational document is stored under `{type}_{id}`. Documents whose
//! identifier does not follow that shape (design documents, local
//! checkpoints, index documents) parse with an empty type and are treated as
//! non-relational.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Separator between the type prefix and the record id.
pub const DOC_ID_SEPARATOR: char = '_';

/// Identifies one record in the record cache: `(type, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub record_type: String,
    pub record_id: String,
}

impl RecordKey {
    /// Creates a key from a record type name and a record id.
    pub fn new(record_type: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            record_id: record_id.into(),
        }
    }

    /// Returns the document id this record is stored under.
    #[must_use]
    pub fn doc_id(&self) -> String {
        format_doc_id(&self.record_type, &self.record_id)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.record_type, self.record_id)
    }
}

/// Result of parsing a raw document identifier.
///
/// Non-relational documents parse as `{ record_type: "", id: None }`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParsedDocId {
    pub record_type: String,
    pub id: Option<String>,
}

impl ParsedDocId {
    /// Parses a raw document id using the `{type}_{id}` convention.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(DOC_ID_SEPARATOR) {
            Some((record_type, id)) if !record_type.is_empty() => Self {
                record_type: record_type.to_string(),
                id: (!id.is_empty()).then(|| id.to_string()),
            },
            _ => Self::default(),
        }
    }

    /// Whether the document belongs to the relational mapping layer.
    pub fn is_relational(&self) -> bool {
        !self.record_type.is_empty()
    }

    /// Converts into a record key when both type and id are present.
    pub fn into_key(self) -> Option<RecordKey> {
        if !self.is_relational() {
            return None;
        }
        self.id.map(|id| RecordKey::new(self.record_type, id))
    }
}

/// Formats a relational document id.
pub fn format_doc_id(record_type: &str, id: &str) -> String {
    format!("{record_type}{DOC_ID_SEPARATOR}{id}")
}

/// Generates an id for a record saved without one.
/// Uses UUID v7 so generated ids sort by creation time.
#[must_use]
pub fn generate_record_id() -> String {
    Uuid::now_v7().simple().to_string()
}
