use async_trait::async_trait;
use pretty_assertions::assert_eq;
use relsync_adapter::{Adapter, AdapterConfig, AdapterError};
use relsync_model::{ModelCatalog, ModelRegistry, ModelType, RecordSnapshot, SchemaDefinition};
use relsync_storage::{
    DeleteResult, Direction, DocumentStore, FindQuery, MemoryStore, RelationalPayload,
    RemoteDatabase, ReplicationOptions, ReplicationStream, StorageError, StorageResult,
};
use relsync_sync::{AdapterEvent, CacheError, CachedRecord, EventKind, RecordCache, ReplicationPhase};
use relsync_types::{RecordDocument, RecordKey};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

// ── Fixtures ─────────────────────────────────────────────────────

fn blog_catalog() -> Arc<ModelCatalog> {
    Arc::new(
        ModelCatalog::new()
            .with(
                ModelType::versioned("post")
                    .attribute("title")
                    .belongs_to("author", "author"),
            )
            .with(ModelType::versioned("author").attribute("name"))
            .with(ModelType::new("draft").attribute("title")),
    )
}

fn model(catalog: &ModelCatalog, name: &str) -> Arc<ModelType> {
    catalog.model_for(name).unwrap()
}

fn local_adapter(store: &MemoryStore) -> (Adapter, Arc<ModelCatalog>) {
    let catalog = blog_catalog();
    let adapter = Adapter::builder(catalog.clone())
        .db(Arc::new(store.clone()))
        .build();
    (adapter, catalog)
}

/// Delegates to a `MemoryStore` and counts schema pushes.
struct CountingStore {
    inner: MemoryStore,
    schema_pushes: AtomicUsize,
}

#[async_trait]
impl DocumentStore for CountingStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn set_schema(&self, schema: &[SchemaDefinition]) -> StorageResult<()> {
        self.schema_pushes.fetch_add(1, Ordering::SeqCst);
        self.inner.set_schema(schema).await
    }

    async fn find(&self, record_type: &str, query: FindQuery) -> StorageResult<RelationalPayload> {
        self.inner.find(record_type, query).await
    }

    async fn save(&self, record_type: &str, doc: RecordDocument) -> StorageResult<RecordDocument> {
        self.inner.save(record_type, doc).await
    }

    async fn delete(&self, record_type: &str, doc: RecordDocument) -> StorageResult<DeleteResult> {
        self.inner.delete(record_type, doc).await
    }

    async fn destroy(&self) -> StorageResult<()> {
        self.inner.destroy().await
    }

    async fn replicate_to(
        &self,
        remote: Arc<dyn RemoteDatabase>,
        options: ReplicationOptions,
    ) -> StorageResult<ReplicationStream> {
        self.inner.replicate_to(remote, options).await
    }

    async fn replicate_from(
        &self,
        remote: Arc<dyn RemoteDatabase>,
        options: ReplicationOptions,
    ) -> StorageResult<ReplicationStream> {
        self.inner.replicate_from(remote, options).await
    }
}

/// Answers every find with a fixed payload.
struct FixedPayloadStore {
    payload: RelationalPayload,
}

#[async_trait]
impl DocumentStore for FixedPayloadStore {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn set_schema(&self, _schema: &[SchemaDefinition]) -> StorageResult<()> {
        Ok(())
    }

    async fn find(&self, _record_type: &str, _query: FindQuery) -> StorageResult<RelationalPayload> {
        Ok(self.payload.clone())
    }

    async fn save(&self, _record_type: &str, doc: RecordDocument) -> StorageResult<RecordDocument> {
        Ok(doc)
    }

    async fn delete(&self, _record_type: &str, _doc: RecordDocument) -> StorageResult<DeleteResult> {
        Err(StorageError::NotFound("fixed".into()))
    }

    async fn destroy(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn replicate_to(
        &self,
        _remote: Arc<dyn RemoteDatabase>,
        _options: ReplicationOptions,
    ) -> StorageResult<ReplicationStream> {
        Err(StorageError::Offline("fixed".into()))
    }

    async fn replicate_from(
        &self,
        _remote: Arc<dyn RemoteDatabase>,
        _options: ReplicationOptions,
    ) -> StorageResult<ReplicationStream> {
        Err(StorageError::Offline("fixed".into()))
    }
}

async fn find_post_42(payload: RelationalPayload) -> Result<RelationalPayload, AdapterError> {
    let catalog = blog_catalog();
    let adapter = Adapter::builder(catalog.clone())
        .db(Arc::new(FixedPayloadStore { payload }))
        .build();
    adapter.find_record(&model(&catalog, "post"), "42").await
}

fn post_42() -> Vec<RecordDocument> {
    vec![RecordDocument::from_value(json!({"id": "42", "title": "found"})).unwrap()]
}

/// Records every cache call on a channel.
struct ChannelCache {
    calls: mpsc::UnboundedSender<(&'static str, RecordKey)>,
}

#[async_trait]
impl RecordCache for ChannelCache {
    fn peek(&self, _key: &RecordKey) -> Option<CachedRecord> {
        Some(CachedRecord { is_deleted: false })
    }

    fn unload(&self, key: &RecordKey) {
        let _ = self.calls.send(("unload", key.clone()));
    }

    async fn find_record(&self, key: &RecordKey) -> Result<(), CacheError> {
        let _ = self.calls.send(("reload", key.clone()));
        Ok(())
    }
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed")
}

// ── Configuration errors ─────────────────────────────────────────

#[tokio::test]
async fn missing_db_is_a_configuration_error() {
    let catalog = blog_catalog();
    let adapter = Adapter::builder(catalog.clone()).build();

    let err = adapter.find_all(&model(&catalog, "post")).await.unwrap_err();
    assert!(matches!(err, AdapterError::Configuration(_)));
    assert_eq!(err.to_string(), "Please set the `db` property on the adapter.");
}

#[tokio::test]
async fn model_without_rev_is_rejected() {
    let store = MemoryStore::new("local");
    let (adapter, catalog) = local_adapter(&store);

    let err = adapter.find_all(&model(&catalog, "draft")).await.unwrap_err();
    assert!(matches!(err, AdapterError::Configuration(_)));
    assert_eq!(
        err.to_string(),
        "Please add a `rev` attribute of type `string` on the Draft model."
    );
    assert!(store.schema().is_empty());
}

#[tokio::test]
async fn replication_without_remote_is_a_configuration_error() {
    let store = MemoryStore::new("local");
    let (adapter, _) = local_adapter(&store);

    let err = assert_err!(adapter.start_replication(true).await);
    assert!(matches!(err, AdapterError::Configuration(_)));
    assert_err!(adapter.start_listen_changes(None).await);

    // Stopping what never started is fine.
    assert_ok!(adapter.stop_replication());
    assert_ok!(adapter.stop_listen_changes());
    assert_eq!(adapter.replication_phase(Direction::Inbound), ReplicationPhase::Idle);
}

// ── Schema registration ──────────────────────────────────────────

#[tokio::test]
async fn schema_is_pushed_once_per_new_type_graph() {
    let store = Arc::new(CountingStore {
        inner: MemoryStore::new("local"),
        schema_pushes: AtomicUsize::new(0),
    });
    let catalog = blog_catalog();
    let adapter = Adapter::builder(catalog.clone()).db(store.clone()).build();

    adapter.find_all(&model(&catalog, "post")).await.unwrap();
    adapter.find_all(&model(&catalog, "post")).await.unwrap();
    // Already registered through post's belongs-to.
    adapter.find_all(&model(&catalog, "author")).await.unwrap();

    assert_eq!(store.schema_pushes.load(Ordering::SeqCst), 1);
    assert_eq!(adapter.registered_types().await, vec!["post", "author"]);
    assert_eq!(store.inner.schema().len(), 2);
}

// ── Records ──────────────────────────────────────────────────────

#[tokio::test]
async fn create_then_find_record() {
    let store = MemoryStore::new("local");
    let (adapter, catalog) = local_adapter(&store);
    let post = model(&catalog, "post");

    let saved = adapter
        .create_record(
            &post,
            &RecordSnapshot::new()
                .with_id("1")
                .with_attribute("title", json!("Hello"))
                .with_attribute("rev", json!(null))
                .with_attribute("undeclared", json!(true)),
        )
        .await
        .unwrap();
    assert_eq!(saved.id(), Some("1"));
    assert!(saved.rev().is_some());
    assert!(saved.get("undeclared").is_none());

    let payload = adapter.find_record(&post, "1").await.unwrap();
    let posts = payload.get("posts").unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].get("title"), Some(&json!("Hello")));
}

#[tokio::test]
async fn create_without_id_generates_one() {
    let store = MemoryStore::new("local");
    let (adapter, catalog) = local_adapter(&store);

    let saved = adapter
        .create_record(
            &model(&catalog, "post"),
            &RecordSnapshot::new().with_attribute("title", json!("untitled")),
        )
        .await
        .unwrap();
    let id = saved.id().unwrap();
    assert!(!id.is_empty());
    assert_eq!(store.doc_count(), 1);
}

#[tokio::test]
async fn find_record_missing_is_not_found() {
    let store = MemoryStore::new("local");
    let (adapter, catalog) = local_adapter(&store);

    let err = adapter
        .find_record(&model(&catalog, "post"), "404")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Not found: type \"post\" with id \"404\"");
}

#[tokio::test]
async fn find_record_rejects_payloads_without_results() {
    let payloads = [
        RelationalPayload::new(),
        RelationalPayload::new().with("post", Vec::new()),
        RelationalPayload::new().with("posts", Vec::new()),
        RelationalPayload::new().with("post", Vec::new()).with("posts", Vec::new()),
        RelationalPayload::new().with("authors", post_42()),
    ];
    for payload in payloads {
        let err = find_post_42(payload.clone()).await.unwrap_err();
        match &err {
            AdapterError::NotFound { record_type, id } => {
                assert_eq!((record_type.as_str(), id.as_str()), ("post", "42"));
            }
            other => panic!("expected NotFound for {payload:?}, got {other:?}"),
        }
        assert_eq!(err.to_string(), "Not found: type \"post\" with id \"42\"");
    }
}

#[tokio::test]
async fn find_record_accepts_singular_or_plural_key() {
    let singular = find_post_42(RelationalPayload::new().with("post", post_42()))
        .await
        .unwrap();
    assert_eq!(singular.get("post").unwrap()[0].id(), Some("42"));

    let plural = find_post_42(RelationalPayload::new().with("posts", post_42()))
        .await
        .unwrap();
    assert_eq!(plural.get("posts").unwrap()[0].id(), Some("42"));

    // An empty singular list does not hide plural results.
    let both = RelationalPayload::new()
        .with("post", Vec::new())
        .with("posts", post_42());
    assert_ok!(find_post_42(both).await);
}

#[tokio::test]
#[allow(deprecated)]
async fn find_forwards_to_find_record() {
    let store = MemoryStore::new("local");
    let (adapter, catalog) = local_adapter(&store);
    let post = model(&catalog, "post");
    adapter
        .create_record(&post, &RecordSnapshot::new().with_id("1"))
        .await
        .unwrap();

    assert_ok!(adapter.find(&post, "1").await);
    assert!(matches!(
        adapter.find(&post, "2").await,
        Err(AdapterError::NotFound { .. })
    ));
}

#[tokio::test]
async fn find_all_and_find_many_sideload_relations() {
    let store = MemoryStore::new("local");
    let (adapter, catalog) = local_adapter(&store);
    let post = model(&catalog, "post");
    let author = model(&catalog, "author");

    adapter
        .create_record(
            &author,
            &RecordSnapshot::new().with_id("a").with_attribute("name", json!("Ada")),
        )
        .await
        .unwrap();
    for id in ["1", "2", "3"] {
        adapter
            .create_record(
                &post,
                &RecordSnapshot::new().with_id(id).with_belongs_to("author", Some("a")),
            )
            .await
            .unwrap();
    }

    let all = adapter.find_all(&post).await.unwrap();
    assert_eq!(all.get("posts").unwrap().len(), 3);
    assert_eq!(all.get("authors").unwrap().len(), 1);

    let some = adapter
        .find_many(&post, &["1".to_string(), "3".to_string(), "9".to_string()])
        .await
        .unwrap();
    let ids: Vec<_> = some.get("posts").unwrap().iter().filter_map(|d| d.id()).collect();
    assert_eq!(ids, vec!["1", "3"]);
}

#[tokio::test]
async fn find_query_is_unsupported() {
    let store = MemoryStore::new("local");
    let (adapter, catalog) = local_adapter(&store);

    let err = adapter
        .find_query(&model(&catalog, "post"), &json!({"title": "x"}))
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::UnsupportedOperation(_)));
}

#[tokio::test]
async fn update_requires_current_rev() {
    let store = MemoryStore::new("local");
    let (adapter, catalog) = local_adapter(&store);
    let post = model(&catalog, "post");

    let first = adapter
        .create_record(&post, &RecordSnapshot::new().with_id("1"))
        .await
        .unwrap();
    let rev = first.rev().unwrap().to_string();

    let updated = adapter
        .update_record(
            &post,
            &RecordSnapshot::new()
                .with_id("1")
                .with_attribute("rev", json!(rev))
                .with_attribute("title", json!("edited")),
        )
        .await
        .unwrap();
    assert_ne!(updated.rev(), Some(rev.as_str()));

    let stale = adapter
        .update_record(
            &post,
            &RecordSnapshot::new().with_id("1").with_attribute("rev", json!(rev)),
        )
        .await
        .unwrap_err();
    assert!(matches!(stale, AdapterError::Storage(StorageError::Conflict(_))));
}

#[tokio::test]
async fn delete_returns_empty_payload() {
    let store = MemoryStore::new("local");
    let (adapter, catalog) = local_adapter(&store);
    let post = model(&catalog, "post");

    let saved = adapter
        .create_record(&post, &RecordSnapshot::new().with_id("1"))
        .await
        .unwrap();
    let payload = adapter
        .delete_record(
            &post,
            &RecordSnapshot::new()
                .with_id("1")
                .with_attribute("rev", json!(saved.rev().unwrap())),
        )
        .await
        .unwrap();

    assert!(payload.is_empty());
    assert!(store.is_deleted("post_1"));
    assert_err!(adapter.find_record(&post, "1").await);
}

#[tokio::test]
async fn destroy_local_db_forgets_schema() {
    let store = MemoryStore::new("local");
    let (adapter, catalog) = local_adapter(&store);
    adapter
        .create_record(&model(&catalog, "post"), &RecordSnapshot::new().with_id("1"))
        .await
        .unwrap();
    assert!(!adapter.registered_types().await.is_empty());

    adapter.destroy_local_db().await.unwrap();

    assert!(adapter.registered_types().await.is_empty());
    assert_eq!(store.doc_count(), 0);
    let err = adapter.find_all(&model(&catalog, "post")).await.unwrap_err();
    assert!(matches!(err, AdapterError::Storage(StorageError::Destroyed(_))));
}

// ── Replication ──────────────────────────────────────────────────

#[tokio::test]
async fn default_replication_pulls_remote_records_into_cache() {
    let local = MemoryStore::new("local");
    let remote = MemoryStore::new("remote");
    let (calls_tx, mut calls) = mpsc::unbounded_channel();
    let catalog = blog_catalog();
    let adapter = Adapter::builder(catalog.clone())
        .db(Arc::new(local.clone()))
        .remote(Arc::new(remote.clone()), Arc::new(ChannelCache { calls: calls_tx }))
        .build();

    let (paused_tx, mut paused) = mpsc::unbounded_channel();
    adapter.events().on(EventKind::ReplicationPaused, move |event| {
        let _ = paused_tx.send(event.direction());
    });

    adapter.start_default_replication().await.unwrap();
    assert!(adapter.coordinator().unwrap().is_replicating());
    recv(&mut paused).await;
    recv(&mut paused).await;

    remote
        .save(
            "post",
            RecordDocument::from_value(json!({"id": "7", "title": "remote"})).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(recv(&mut calls).await, ("reload", RecordKey::new("post", "7")));

    let payload = adapter.find_record(&model(&catalog, "post"), "7").await.unwrap();
    assert_eq!(
        payload.get("posts").unwrap()[0].get("title"),
        Some(&json!("remote"))
    );

    adapter.stop_replication().unwrap();
    assert!(!adapter.coordinator().unwrap().is_replicating());
}

#[tokio::test]
async fn listener_uses_configured_include_docs() {
    let local = MemoryStore::new("local");
    let remote = MemoryStore::new("remote");
    let (calls_tx, _calls) = mpsc::unbounded_channel();
    let config = AdapterConfig {
        include_docs: true,
        ..AdapterConfig::default()
    };
    let adapter = Adapter::builder(blog_catalog())
        .db(Arc::new(local))
        .remote(Arc::new(remote.clone()), Arc::new(ChannelCache { calls: calls_tx }))
        .config(config)
        .build();

    let (tx, mut changes) = mpsc::unbounded_channel();
    adapter.events().on(EventKind::ChangesChange, move |event| {
        if let AdapterEvent::ChangesChange { change } = event {
            let _ = tx.send(change.clone());
        }
    });

    adapter.start_listen_changes(None).await.unwrap();
    assert!(adapter.coordinator().unwrap().is_listening());

    remote
        .save("post", RecordDocument::from_value(json!({"id": "1"})).unwrap())
        .await
        .unwrap();
    let change = recv(&mut changes).await;
    assert_eq!(change.id, "post_1");
    assert!(change.doc.is_some());

    adapter.stop_listen_changes().unwrap();
    assert!(!adapter.coordinator().unwrap().is_listening());
}
