//! The adapter facade.

use crate::config::AdapterConfig;
use crate::error::{AdapterError, AdapterResult};
use relsync_model::{ModelRegistry, ModelType, RecordTranslator, RecordView, SchemaRegistrar};
use relsync_storage::{Direction, DocumentStore, FindQuery, RelationalPayload, RemoteDatabase};
use relsync_sync::{EventBus, RecordCache, ReplicationCoordinator, ReplicationPhase};
use relsync_types::inflect::pluralize;
use relsync_types::RecordDocument;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const MISSING_DB: &str = "Please set the `db` property on the adapter.";
const MISSING_REMOTE: &str = "Please set the `remote` property on the adapter.";

/// Builds an [`Adapter`].
pub struct AdapterBuilder {
    registry: Arc<dyn ModelRegistry>,
    db: Option<Arc<dyn DocumentStore>>,
    remote: Option<(Arc<dyn RemoteDatabase>, Arc<dyn RecordCache>)>,
    config: AdapterConfig,
}

impl AdapterBuilder {
    /// Sets the local document store.
    pub fn db(mut self, db: Arc<dyn DocumentStore>) -> Self {
        self.db = Some(db);
        self
    }

    /// Sets the remote to replicate with and the record cache that
    /// replication keeps current.
    pub fn remote(mut self, remote: Arc<dyn RemoteDatabase>, cache: Arc<dyn RecordCache>) -> Self {
        self.remote = Some((remote, cache));
        self
    }

    pub fn config(mut self, config: AdapterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Adapter {
        let events = Arc::new(EventBus::new());
        let coordinator = match (&self.db, self.remote) {
            (Some(db), Some((remote, cache))) => Some(ReplicationCoordinator::with_events(
                Arc::clone(db),
                remote,
                cache,
                Arc::clone(&events),
            )),
            _ => None,
        };
        Adapter {
            registry: self.registry,
            db: self.db,
            config: self.config,
            registrar: Mutex::new(SchemaRegistrar::new()),
            events,
            coordinator,
        }
    }
}

/// Persists typed records in a document store and keeps a record cache in
/// sync with replication.
///
/// Every record operation first registers the record's model (and,
/// transitively, the models it relates to) with the store's relational
/// schema.
pub struct Adapter {
    registry: Arc<dyn ModelRegistry>,
    db: Option<Arc<dyn DocumentStore>>,
    config: AdapterConfig,
    registrar: Mutex<SchemaRegistrar>,
    events: Arc<EventBus>,
    coordinator: Option<ReplicationCoordinator>,
}

impl Adapter {
    pub fn builder(registry: Arc<dyn ModelRegistry>) -> AdapterBuilder {
        AdapterBuilder {
            registry,
            db: None,
            remote: None,
            config: AdapterConfig::default(),
        }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Lifecycle events from replication and the change listener.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Whether the host framework may coalesce single-record lookups.
    pub fn coalesce_find_requests(&self) -> bool {
        self.config.coalesce_find_requests
    }

    pub fn should_reload_all(&self) -> bool {
        self.config.reload.should_reload_all
    }

    pub fn should_background_reload_all(&self) -> bool {
        self.config.reload.should_background_reload_all
    }

    pub fn should_reload_record(&self) -> bool {
        self.config.reload.should_reload_record
    }

    pub fn should_background_reload_record(&self) -> bool {
        self.config.reload.should_background_reload_record
    }

    /// Names of the record types registered so far, in registration order.
    pub async fn registered_types(&self) -> Vec<String> {
        self.registrar
            .lock()
            .await
            .schema()
            .iter()
            .map(|def| def.singular.clone())
            .collect()
    }

    // ── Records ─────────────────────────────────────────────────

    /// All records of a type.
    pub async fn find_all(&self, model: &ModelType) -> AdapterResult<RelationalPayload> {
        let db = self.prepare(model).await?;
        Ok(db.find(&model.record_type_name(), FindQuery::All).await?)
    }

    /// One record. Fails with [`AdapterError::NotFound`] when the payload
    /// holds no results for the type.
    pub async fn find_record(&self, model: &ModelType, id: &str) -> AdapterResult<RelationalPayload> {
        let db = self.prepare(model).await?;
        let record_type = model.record_type_name();
        let payload = db.find(&record_type, FindQuery::One(id.to_string())).await?;

        let plural = pluralize(&record_type);
        if payload.results_for(&record_type, &plural).is_none() {
            return Err(AdapterError::NotFound {
                record_type,
                id: id.to_string(),
            });
        }
        Ok(payload)
    }

    #[deprecated(note = "use `find_record`")]
    pub async fn find(&self, model: &ModelType, id: &str) -> AdapterResult<RelationalPayload> {
        self.find_record(model, id).await
    }

    /// Several records by id. Missing ids are left out.
    pub async fn find_many(&self, model: &ModelType, ids: &[String]) -> AdapterResult<RelationalPayload> {
        let db = self.prepare(model).await?;
        Ok(db
            .find(&model.record_type_name(), FindQuery::Many(ids.to_vec()))
            .await?)
    }

    /// Queries are not supported.
    pub async fn find_query(&self, _model: &ModelType, _query: &Value) -> AdapterResult<RelationalPayload> {
        Err(AdapterError::UnsupportedOperation(
            "findQuery not yet supported by relsync. Use find_all and filter the results.".into(),
        ))
    }

    /// Saves a new record. Returns the stored document with its id and
    /// revision.
    pub async fn create_record(&self, model: &ModelType, record: &dyn RecordView) -> AdapterResult<RecordDocument> {
        self.save(model, record).await
    }

    /// Saves an existing record. The record must carry its current
    /// revision.
    pub async fn update_record(&self, model: &ModelType, record: &dyn RecordView) -> AdapterResult<RecordDocument> {
        self.save(model, record).await
    }

    /// Deletes a record. The response payload is always empty.
    pub async fn delete_record(&self, model: &ModelType, record: &dyn RecordView) -> AdapterResult<RelationalPayload> {
        let db = self.prepare(model).await?;
        let doc = RecordTranslator::to_document(model, record)?;
        let result = db.delete(&model.record_type_name(), doc).await?;
        debug!("Deleted {} {} at {}", model.record_type_name(), result.id, result.rev);
        Ok(RelationalPayload::new())
    }

    /// Forgets the registered schema and destroys the local database.
    pub async fn destroy_local_db(&self) -> AdapterResult<()> {
        let db = self.db()?;
        self.registrar.lock().await.reset();
        db.destroy().await?;
        info!("Destroyed local database {}", db.name());
        Ok(())
    }

    // ── Replication ─────────────────────────────────────────────

    /// Starts replication in both directions.
    pub async fn start_replication(&self, live_retry: bool) -> AdapterResult<()> {
        Ok(self.coordinator()?.start_replication(live_retry).await?)
    }

    /// Starts replication with the configured live/retry flag.
    pub async fn start_default_replication(&self) -> AdapterResult<()> {
        self.start_replication(self.config.live_retry).await
    }

    pub fn stop_replication(&self) -> AdapterResult<()> {
        match &self.coordinator {
            Some(coordinator) => Ok(coordinator.stop_replication()?),
            None => Ok(()),
        }
    }

    /// Starts listening to remote changes. `None` uses the configured
    /// `include_docs`.
    pub async fn start_listen_changes(&self, include_docs: Option<bool>) -> AdapterResult<()> {
        let include_docs = include_docs.unwrap_or(self.config.include_docs);
        Ok(self.coordinator()?.start_listen_changes(include_docs).await?)
    }

    pub fn stop_listen_changes(&self) -> AdapterResult<()> {
        match &self.coordinator {
            Some(coordinator) => Ok(coordinator.stop_listen_changes()?),
            None => Ok(()),
        }
    }

    /// Phase of one replication direction; `Idle` without a remote.
    pub fn replication_phase(&self, direction: Direction) -> ReplicationPhase {
        self.coordinator
            .as_ref()
            .map_or(ReplicationPhase::Idle, |c| c.phase(direction))
    }

    /// The coordinator, when a remote is configured.
    pub fn coordinator(&self) -> AdapterResult<&ReplicationCoordinator> {
        self.db()?;
        self.coordinator
            .as_ref()
            .ok_or_else(|| AdapterError::Configuration(MISSING_REMOTE.into()))
    }

    /// Cancels replication and the change listener.
    pub fn shutdown(&self) {
        if let Some(coordinator) = &self.coordinator {
            coordinator.shutdown();
        }
    }

    // ── Internals ───────────────────────────────────────────────

    fn db(&self) -> AdapterResult<&Arc<dyn DocumentStore>> {
        self.db
            .as_ref()
            .ok_or_else(|| AdapterError::Configuration(MISSING_DB.into()))
    }

    /// Registers `model` and pushes the schema if registration changed it.
    async fn prepare(&self, model: &ModelType) -> AdapterResult<&Arc<dyn DocumentStore>> {
        let db = self.db()?;
        let mut registrar = self.registrar.lock().await;
        if registrar.register(self.registry.as_ref(), model)? {
            db.set_schema(registrar.schema()).await?;
            info!(
                "Pushed schema with {} types to {}",
                registrar.schema().len(),
                db.name()
            );
        }
        Ok(db)
    }

    async fn save(&self, model: &ModelType, record: &dyn RecordView) -> AdapterResult<RecordDocument> {
        let db = self.prepare(model).await?;
        let doc = RecordTranslator::to_document(model, record)?;
        Ok(db.save(&model.record_type_name(), doc).await?)
    }
}

impl Drop for Adapter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("db", &self.db.as_ref().map(|db| db.name().to_string()))
            .field("config", &self.config)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}
