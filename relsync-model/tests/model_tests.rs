use relsync_model::{
    ModelCatalog, ModelRegistry, ModelType, RelationTarget, RelationshipKind, REVISION_ATTRIBUTE,
};
use serde_json::json;
use std::sync::Arc;

#[test]
fn versioned_model_declares_rev() {
    let model = ModelType::versioned("post");
    assert!(model.has_attribute(REVISION_ATTRIBUTE));
    assert!(!ModelType::new("post").has_attribute(REVISION_ATTRIBUTE));
}

#[test]
fn record_type_name_is_camelized() {
    assert_eq!(ModelType::new("blog-post").record_type_name(), "blogPost");
    assert_eq!(ModelType::new("post").record_type_name(), "post");
}

#[test]
fn builder_collects_relationships_in_order() {
    let model = ModelType::versioned("post")
        .attribute("title")
        .belongs_to("author", "author")
        .has_many("comments", "comment")
        .with_options(json!({"async": false}).as_object().unwrap().clone());

    assert_eq!(model.relationships.len(), 2);
    assert_eq!(model.relationships[0].key, "author");
    assert_eq!(model.relationships[0].kind, RelationshipKind::BelongsTo);
    assert!(model.relationships[0].options.is_empty());
    assert_eq!(model.relationships[1].kind, RelationshipKind::HasMany);
    assert_eq!(model.relationships[1].options.get("async"), Some(&json!(false)));
}

#[test]
fn direct_model_target() {
    let author = Arc::new(ModelType::versioned("author"));
    let post = ModelType::versioned("post").relationship(
        "author",
        RelationshipKind::BelongsTo,
        RelationTarget::Model(author.clone()),
    );
    match &post.relationships[0].target {
        RelationTarget::Model(m) => assert_eq!(m.model_name, "author"),
        RelationTarget::Name(_) => panic!("Expected direct model target"),
    }
}

#[test]
fn catalog_lookup() {
    let catalog = ModelCatalog::new()
        .with(ModelType::versioned("post"))
        .with(ModelType::versioned("author"));

    assert_eq!(catalog.len(), 2);
    assert!(!catalog.is_empty());
    assert_eq!(catalog.model_for("post").unwrap().model_name, "post");
    assert!(catalog.model_for("comment").is_none());
}

#[test]
fn catalog_insert_replaces() {
    let mut catalog = ModelCatalog::new();
    catalog.insert(ModelType::new("post"));
    catalog.insert(ModelType::versioned("post"));
    assert_eq!(catalog.len(), 1);
    assert!(catalog.model_for("post").unwrap().has_attribute("rev"));
}
