//! Relational schema registration.
//!
//! The registrar walks a model's relationship graph and accumulates one
//! [`SchemaDefinition`] per record type. Registration is memoized by
//! singular name, which also terminates traversal of cyclic graphs.
//!
//! A registration call chain is staged and committed atomically: if any
//! model reachable from the root fails validation, the accumulated schema is
//! left exactly as it was.

use crate::error::{ModelError, ModelResult};
use crate::model::{ModelRegistry, ModelType, RelationTarget, RelationshipKind, REVISION_ATTRIBUTE};
use crate::schema::{RelationDescriptor, SchemaDefinition};
use relsync_types::inflect::{classify, pluralize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Accumulates schema definitions for one adapter instance.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistrar {
    schema: Vec<SchemaDefinition>,
}

impl SchemaRegistrar {
    /// Creates an empty registrar.
    pub fn new() -> Self {
        Self::default()
    }

    /// The accumulated schema, in registration order.
    pub fn schema(&self) -> &[SchemaDefinition] {
        &self.schema
    }

    /// Whether a type with this singular name has been registered.
    pub fn is_registered(&self, singular: &str) -> bool {
        self.schema.iter().any(|def| def.singular == singular)
    }

    /// Forgets every registered type.
    pub fn reset(&mut self) {
        self.schema.clear();
    }

    /// Registers `model` and every model reachable through its belongs-to
    /// and has-many relationships.
    ///
    /// Returns `Ok(true)` when new entries were added, meaning the schema must
    /// be pushed to the store again.
    pub fn register(
        &mut self,
        registry: &dyn ModelRegistry,
        model: &ModelType,
    ) -> ModelResult<bool> {
        let mut staged = Vec::new();
        self.stage(registry, model, &mut staged)?;
        if staged.is_empty() {
            return Ok(false);
        }

        debug!(
            "Registered {} schema entr{} starting at {}",
            staged.len(),
            if staged.len() == 1 { "y" } else { "ies" },
            model.model_name
        );
        self.schema.extend(staged);
        Ok(true)
    }

    fn stage(
        &self,
        registry: &dyn ModelRegistry,
        model: &ModelType,
        staged: &mut Vec<SchemaDefinition>,
    ) -> ModelResult<()> {
        let singular = model.record_type_name();

        if !model.has_attribute(REVISION_ATTRIBUTE) {
            return Err(ModelError::Configuration(format!(
                "Please add a `{REVISION_ATTRIBUTE}` attribute of type `string` on the {} model.",
                classify(&singular)
            )));
        }

        if self.is_registered(&singular) || staged.iter().any(|def| def.singular == singular) {
            return Ok(());
        }

        // Pushed before walking relations so cycles back to this type stop here.
        let index = staged.len();
        staged.push(SchemaDefinition {
            plural: pluralize(&singular),
            singular,
            document_type: model.document_type.clone(),
            relations: None,
        });

        let mut relations = BTreeMap::new();
        for rel in &model.relationships {
            let belongs_to = match &rel.kind {
                RelationshipKind::BelongsTo => true,
                RelationshipKind::HasMany => false,
                // TODO: map inverse relationships once the store supports them
                RelationshipKind::Other(_) => continue,
            };
            let related = match &rel.target {
                RelationTarget::Model(related) => Some(Arc::clone(related)),
                RelationTarget::Name(name) => registry.model_for(name),
            };
            let Some(related) = related else {
                warn!(
                    "Skipping relationship {}.{}: related model not found",
                    model.model_name, rel.key
                );
                continue;
            };

            let related_type = related.record_type_name();
            let options = rel.options.clone();
            let descriptor = if belongs_to {
                RelationDescriptor::BelongsTo {
                    related_type,
                    options,
                }
            } else {
                RelationDescriptor::HasMany {
                    related_type,
                    options,
                }
            };
            relations.insert(rel.key.clone(), descriptor);

            self.stage(registry, &related, staged)?;
        }

        if !relations.is_empty() {
            staged[index].relations = Some(relations);
        }
        Ok(())
    }
}
