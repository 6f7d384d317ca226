//! Flat record documents and change notifications.

use crate::{Error, Result, Revision};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field holding the record identity.
pub const ID_FIELD: &str = "id";

/// Field holding the revision marker.
pub const REV_FIELD: &str = "rev";

/// A flat key-value payload representing one record.
///
/// The presence of [`REV_FIELD`] tells the store whether a save is an update
/// (revision present) or a create (revision absent).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordDocument(Map<String, Value>);

impl RecordDocument {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing JSON object.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Converts a JSON value into a document. Only objects are accepted.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::Serialization(serde::de::Error::custom(format!(
                "expected a JSON object, got {other}"
            )))),
        }
    }

    /// Returns the record id, if set.
    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    /// Sets the record id.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert(ID_FIELD.to_string(), Value::String(id.into()));
    }

    /// Returns the raw revision string, if set and non-null.
    pub fn rev(&self) -> Option<&str> {
        self.0.get(REV_FIELD).and_then(Value::as_str)
    }

    /// Parses the revision marker.
    pub fn revision(&self) -> Result<Option<Revision>> {
        self.rev().map(str::parse).transpose()
    }

    /// Sets the revision marker.
    pub fn set_rev(&mut self, rev: &Revision) {
        self.0.insert(REV_FIELD.to_string(), Value::String(rev.to_string()));
    }

    /// Removes a `null` revision so the store sees a create.
    pub fn strip_null_rev(&mut self) {
        if matches!(self.0.get(REV_FIELD), Some(Value::Null)) {
            self.0.remove(REV_FIELD);
        }
    }

    /// Gets a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Sets a field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Removes a field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Returns true if the field is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Borrows the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Unwraps into the underlying map.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Converts into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for RecordDocument {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// One changed document as reported by a change feed or replication batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChange {
    /// Raw document id (e.g. `post_42`, `_design/index`).
    pub id: String,
    /// Sequence number in the source store's change log.
    #[serde(default)]
    pub seq: u64,
    /// Revision after the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// Whether the change is a deletion.
    #[serde(default)]
    pub deleted: bool,
    /// Full document body, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<RecordDocument>,
}

impl DocumentChange {
    /// An upsert of `id` without a body.
    pub fn upsert(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            seq: 0,
            rev: None,
            deleted: false,
            doc: None,
        }
    }

    /// A deletion of `id`.
    pub fn deletion(id: impl Into<String>) -> Self {
        Self {
            deleted: true,
            ..Self::upsert(id)
        }
    }
}
