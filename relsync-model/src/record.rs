//! Read-only record views.
//!
//! A record can reach the translator either as a live handle (shared with
//! the record cache and still mutable) or as a point-in-time snapshot. Both
//! expose the same capability: produce the serializable attribute set.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// The serializable state of a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SerializedRecord {
    pub id: Option<String>,
    /// Attributes and relationship foreign keys, flat.
    pub fields: Map<String, Value>,
}

/// Read capability shared by live records and snapshots.
pub trait RecordView {
    /// Returns the record's id and its attributes plus relationship keys.
    fn serializable_attributes(&self) -> SerializedRecord;
}

/// A point-in-time copy of a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSnapshot {
    pub id: Option<String>,
    pub attributes: Map<String, Value>,
    /// Belongs-to keys mapped to the related record id.
    pub belongs_to: BTreeMap<String, Option<String>>,
    /// Has-many keys mapped to the related record ids.
    pub has_many: BTreeMap<String, Vec<String>>,
}

impl RecordSnapshot {
    /// Creates an empty snapshot without an id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Sets a belongs-to relationship.
    pub fn with_belongs_to(mut self, key: impl Into<String>, id: Option<&str>) -> Self {
        self.belongs_to.insert(key.into(), id.map(str::to_string));
        self
    }

    /// Sets a has-many relationship.
    pub fn with_has_many<I, S>(mut self, key: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.has_many
            .insert(key.into(), ids.into_iter().map(Into::into).collect());
        self
    }
}

impl RecordView for RecordSnapshot {
    fn serializable_attributes(&self) -> SerializedRecord {
        let mut fields = self.attributes.clone();
        for (key, id) in &self.belongs_to {
            let value = id.clone().map_or(Value::Null, Value::String);
            fields.insert(key.clone(), value);
        }
        for (key, ids) in &self.has_many {
            let values = ids.iter().cloned().map(Value::String).collect();
            fields.insert(key.clone(), Value::Array(values));
        }
        SerializedRecord {
            id: self.id.clone(),
            fields,
        }
    }
}

/// A live, shared record handle.
///
/// Clones share state; mutations through one clone are visible to all.
#[derive(Debug, Clone, Default)]
pub struct LiveRecord {
    inner: Arc<RwLock<RecordSnapshot>>,
}

impl LiveRecord {
    /// Wraps a snapshot as live state.
    pub fn new(initial: RecordSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Takes a point-in-time snapshot.
    pub fn snapshot(&self) -> RecordSnapshot {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the id.
    pub fn id(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .id
            .clone()
    }

    /// Sets the id (e.g. after the store assigned one).
    pub fn set_id(&self, id: impl Into<String>) {
        self.write().id = Some(id.into());
    }

    /// Sets an attribute.
    pub fn set_attribute(&self, name: impl Into<String>, value: Value) {
        self.write().attributes.insert(name.into(), value);
    }

    /// Sets a belongs-to relationship.
    pub fn set_belongs_to(&self, key: impl Into<String>, id: Option<&str>) {
        self.write()
            .belongs_to
            .insert(key.into(), id.map(str::to_string));
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RecordSnapshot> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordView for LiveRecord {
    fn serializable_attributes(&self) -> SerializedRecord {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .serializable_attributes()
    }
}
