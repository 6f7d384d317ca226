//! Relational operation inputs and results.

use relsync_types::RecordDocument;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which records of a type to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindQuery {
    All,
    One(String),
    Many(Vec<String>),
}

/// Result of a relational find.
///
/// Keyed by type name. Depending on the store, results for the requested
/// type may sit under the singular or the plural spelling; related records
/// are side-loaded under their own type's key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationalPayload(BTreeMap<String, Vec<RecordDocument>>);

impl RelationalPayload {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, docs: Vec<RecordDocument>) -> Self {
        self.0.insert(key.into(), docs);
        self
    }

    /// Documents under `key`.
    pub fn get(&self, key: &str) -> Option<&[RecordDocument]> {
        self.0.get(key).map(Vec::as_slice)
    }

    /// Appends documents under `key`.
    pub fn extend(&mut self, key: &str, docs: impl IntoIterator<Item = RecordDocument>) {
        self.0.entry(key.to_string()).or_default().extend(docs);
    }

    /// Documents for a type, looked up by singular then plural spelling.
    /// Empty lists count as absent.
    pub fn results_for(&self, singular: &str, plural: &str) -> Option<&[RecordDocument]> {
        [singular, plural]
            .into_iter()
            .filter_map(|key| self.get(key))
            .find(|docs| !docs.is_empty())
    }

    /// Type keys present in the payload.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Whether the payload has no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unwraps the map.
    pub fn into_inner(self) -> BTreeMap<String, Vec<RecordDocument>> {
        self.0
    }
}

/// Result of a relational delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub ok: bool,
    pub id: String,
    pub rev: String,
}
