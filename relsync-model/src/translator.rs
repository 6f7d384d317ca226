//! Record → document translation.

use crate::error::{ModelError, ModelResult};
use crate::model::{ModelType, RelationshipKind};
use crate::record::RecordView;
use relsync_types::{RecordDocument, ID_FIELD};

/// Flattens records into documents the store can persist.
///
/// Only fields the model declares (attributes, belongs-to and has-many keys)
/// are serialized. A `null` revision is dropped so the store treats the
/// save as a create.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordTranslator;

impl RecordTranslator {
    /// Serializes `record` as a document of type `model`.
    pub fn to_document(model: &ModelType, record: &dyn RecordView) -> ModelResult<RecordDocument> {
        let serialized = record.serializable_attributes();
        let mut doc = RecordDocument::new();

        for (key, value) in serialized.fields {
            if key == ID_FIELD {
                continue;
            }
            if Self::is_declared(model, &key) {
                doc.insert(key, value);
            }
        }

        match serialized.id {
            Some(id) if id.is_empty() => {
                return Err(ModelError::InvalidRecord(format!(
                    "{} record has an empty id",
                    model.model_name
                )));
            }
            Some(id) => doc.set_id(id),
            None => {}
        }

        doc.strip_null_rev();
        Ok(doc)
    }

    fn is_declared(model: &ModelType, key: &str) -> bool {
        model.has_attribute(key)
            || model.relationships.iter().any(|rel| {
                rel.key == key
                    && matches!(
                        rel.kind,
                        RelationshipKind::BelongsTo | RelationshipKind::HasMany
                    )
            })
    }
}
