use pretty_assertions::assert_eq;
use relsync_model::{RelationDescriptor, SchemaDefinition};
use serde_json::{json, Map};
use std::collections::BTreeMap;

fn post_schema() -> SchemaDefinition {
    let mut relations = BTreeMap::new();
    relations.insert(
        "author".to_string(),
        RelationDescriptor::BelongsTo {
            related_type: "author".into(),
            options: Map::new(),
        },
    );
    relations.insert(
        "comments".to_string(),
        RelationDescriptor::HasMany {
            related_type: "comment".into(),
            options: json!({"async": true}).as_object().unwrap().clone(),
        },
    );
    SchemaDefinition {
        singular: "post".into(),
        plural: "posts".into(),
        document_type: None,
        relations: Some(relations),
    }
}

// ── Serialization shape ──────────────────────────────────────────

#[test]
fn schema_serializes_to_relational_shape() {
    let value = serde_json::to_value(post_schema()).unwrap();
    assert_eq!(
        value,
        json!({
            "singular": "post",
            "plural": "posts",
            "relations": {
                "author": {"belongsTo": {"type": "author", "options": {}}},
                "comments": {"hasMany": {"type": "comment", "options": {"async": true}}}
            }
        })
    );
}

#[test]
fn schema_without_relations_omits_key() {
    let def = SchemaDefinition {
        singular: "author".into(),
        plural: "authors".into(),
        document_type: Some("person".into()),
        relations: None,
    };
    let value = serde_json::to_value(&def).unwrap();
    assert_eq!(
        value,
        json!({"singular": "author", "plural": "authors", "documentType": "person"})
    );
}

#[test]
fn schema_deserializes() {
    let def: SchemaDefinition = serde_json::from_value(json!({
        "singular": "post",
        "plural": "posts",
        "relations": {"author": {"belongsTo": {"type": "author"}}}
    }))
    .unwrap();
    let rel = def.relation("author").unwrap();
    assert!(rel.is_belongs_to());
    assert_eq!(rel.related_type(), "author");
    assert!(rel.options().is_empty());
}

// ── RelationDescriptor accessors ─────────────────────────────────

#[test]
fn descriptor_accessors() {
    let schema = post_schema();
    let comments = schema.relation("comments").unwrap();
    assert!(!comments.is_belongs_to());
    assert_eq!(comments.related_type(), "comment");
    assert_eq!(comments.options().get("async"), Some(&json!(true)));
    assert!(schema.relation("missing").is_none());
}
