//! In-memory document store.
//!
//! Documents live in a `BTreeMap` keyed by relational document id. Every
//! write bumps a store-wide update sequence, published on a watch channel so
//! live change feeds wake up without polling. The store keeps only the
//! current revision of each document; deletions are kept as tombstones so
//! they can be replicated.

mod replicator;

use crate::changes::{ChangeFeed, ChangesEvent, ChangesInfo, ChangesOptions, Since};
use crate::error::{StorageError, StorageResult};
use crate::payload::{DeleteResult, FindQuery, RelationalPayload};
use crate::replication::{Direction, ReplicationOptions, ReplicationStream, StreamError};
use crate::store::{DocumentStore, RemoteDatabase, WriteOutcome};
use crate::stream::StreamEmitter;
use async_trait::async_trait;
use relsync_model::{RelationDescriptor, SchemaDefinition};
use relsync_types::inflect::pluralize;
use relsync_types::{
    format_doc_id, generate_record_id, DocumentChange, ParsedDocId, RecordDocument, Revision,
    ID_FIELD,
};
use replicator::Replicator;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct StoredDoc {
    rev: Revision,
    seq: u64,
    deleted: bool,
    body: RecordDocument,
}

#[derive(Debug, Default)]
struct State {
    docs: BTreeMap<String, StoredDoc>,
    update_seq: u64,
    schema: Vec<SchemaDefinition>,
    destroyed: bool,
}

#[derive(Debug)]
struct Inner {
    name: String,
    state: Mutex<State>,
    seq_tx: watch::Sender<u64>,
    online: AtomicBool,
    read_only: AtomicBool,
}

/// An in-process document store.
///
/// Clones share the same database. Implements both [`DocumentStore`] and
/// [`RemoteDatabase`], so one instance can act as the remote of another.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new(name: impl Into<String>) -> Self {
        let (seq_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: Mutex::new(State::default()),
                seq_tx,
                online: AtomicBool::new(true),
                read_only: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the database name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Simulates connectivity. While offline, change feeds and replicated
    /// writes fail; local CRUD keeps working.
    pub fn set_online(&self, online: bool) {
        self.inner.online.store(online, Ordering::SeqCst);
        info!("Store {} is now {}", self.inner.name, if online { "online" } else { "offline" });
        // Wake live feeds so they notice.
        self.inner.seq_tx.send_modify(|_| {});
    }

    /// Whether the store is reachable.
    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Rejects every write with an authorization failure.
    pub fn set_read_only(&self, read_only: bool) {
        self.inner.read_only.store(read_only, Ordering::SeqCst);
    }

    /// The current update sequence.
    pub fn update_seq(&self) -> u64 {
        self.lock().update_seq
    }

    /// Number of live (non-deleted) documents.
    pub fn doc_count(&self) -> usize {
        self.lock().docs.values().filter(|d| !d.deleted).count()
    }

    /// Returns a live document by raw document id.
    pub fn get(&self, doc_id: &str) -> Option<RecordDocument> {
        self.lock()
            .docs
            .get(doc_id)
            .filter(|d| !d.deleted)
            .map(|d| d.body.clone())
    }

    /// Whether a tombstone exists for the raw document id.
    pub fn is_deleted(&self, doc_id: &str) -> bool {
        self.lock().docs.get(doc_id).is_some_and(|d| d.deleted)
    }

    /// The schema most recently set.
    pub fn schema(&self) -> Vec<SchemaDefinition> {
        self.lock().schema.clone()
    }

    /// Writes a raw, non-relational document (e.g. a design document).
    pub fn put_raw(&self, doc_id: &str, body: RecordDocument) -> StorageResult<Revision> {
        let mut state = self.lock();
        self.ensure_alive(&state)?;
        let rev = match state.docs.get(doc_id) {
            Some(existing) => existing.rev.next(),
            None => Revision::first(),
        };
        self.commit(&mut state, doc_id.to_string(), rev.clone(), false, body);
        Ok(rev)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_alive(&self, state: &State) -> StorageResult<()> {
        if state.destroyed {
            return Err(StorageError::Destroyed(self.inner.name.clone()));
        }
        Ok(())
    }

    fn ensure_online(&self) -> StorageResult<()> {
        if !self.is_online() {
            return Err(StorageError::Offline(self.inner.name.clone()));
        }
        Ok(())
    }

    fn ensure_writable(&self) -> StorageResult<()> {
        if self.inner.read_only.load(Ordering::SeqCst) {
            return Err(StorageError::Unauthorized(format!(
                "{} is read-only",
                self.inner.name
            )));
        }
        Ok(())
    }

    fn commit(
        &self,
        state: &mut State,
        doc_id: String,
        rev: Revision,
        deleted: bool,
        body: RecordDocument,
    ) {
        state.update_seq += 1;
        let seq = state.update_seq;
        state.docs.insert(
            doc_id,
            StoredDoc {
                rev,
                seq,
                deleted,
                body,
            },
        );
        self.inner.seq_tx.send_replace(seq);
    }

    fn plural_for(state: &State, record_type: &str) -> String {
        state
            .schema
            .iter()
            .find(|def| def.singular == record_type)
            .map(|def| def.plural.clone())
            .unwrap_or_else(|| pluralize(record_type))
    }

    /// Adds records related to `docs` under their own type's key.
    fn sideload(state: &State, record_type: &str, docs: &[RecordDocument], payload: &mut RelationalPayload) {
        let Some(relations) = state
            .schema
            .iter()
            .find(|def| def.singular == record_type)
            .and_then(|def| def.relations.as_ref())
        else {
            return;
        };

        for (key, relation) in relations {
            let related_type = relation.related_type();
            let plural = Self::plural_for(state, related_type);
            let mut seen: HashSet<String> = payload
                .get(&plural)
                .unwrap_or_default()
                .iter()
                .filter_map(|d| d.id().map(str::to_string))
                .collect();

            let mut related = Vec::new();
            for doc in docs {
                let ids: Vec<&str> = match (relation, doc.get(key)) {
                    (RelationDescriptor::BelongsTo { .. }, Some(Value::String(id))) => vec![id],
                    (RelationDescriptor::HasMany { .. }, Some(Value::Array(ids))) => {
                        ids.iter().filter_map(Value::as_str).collect()
                    }
                    _ => continue,
                };
                for id in ids {
                    if !seen.insert(id.to_string()) {
                        continue;
                    }
                    if let Some(stored) = state
                        .docs
                        .get(&format_doc_id(related_type, id))
                        .filter(|d| !d.deleted)
                    {
                        related.push(stored.body.clone());
                    }
                }
            }
            if !related.is_empty() {
                payload.extend(&plural, related);
            }
        }
    }

    fn read_changes(&self, since: u64, include_docs: bool) -> StorageResult<Vec<DocumentChange>> {
        self.ensure_online()?;
        let state = self.lock();
        self.ensure_alive(&state)?;
        let mut changes: Vec<DocumentChange> = state
            .docs
            .iter()
            .filter(|(_, d)| d.seq > since)
            .map(|(id, d)| DocumentChange {
                id: id.clone(),
                seq: d.seq,
                rev: Some(d.rev.to_string()),
                deleted: d.deleted,
                doc: include_docs.then(|| d.body.clone()),
            })
            .collect();
        changes.sort_by_key(|c| c.seq);
        Ok(changes)
    }

    async fn run_changes_feed(
        self,
        mut since: u64,
        options: ChangesOptions,
        mut emitter: StreamEmitter<ChangesEvent>,
    ) {
        let mut seq_rx = self.inner.seq_tx.subscribe();
        loop {
            if emitter.is_canceled() {
                debug!("Change feed on {} canceled at seq {}", self.inner.name, since);
                emitter.emit(ChangesEvent::Complete(ChangesInfo {
                    last_seq: since,
                    canceled: true,
                }));
                return;
            }

            // Mark the current sequence seen before reading, so a write that
            // lands after the read still wakes us.
            seq_rx.borrow_and_update();
            let changes = match self.read_changes(since, options.include_docs) {
                Ok(changes) => changes,
                Err(e) => {
                    emitter.emit(ChangesEvent::Error(StreamError::from(&e)));
                    return;
                }
            };
            for change in changes {
                since = change.seq;
                if !emitter.emit(ChangesEvent::Change(change)) {
                    return;
                }
            }

            if !options.live {
                emitter.emit(ChangesEvent::Complete(ChangesInfo {
                    last_seq: since,
                    canceled: false,
                }));
                return;
            }

            tokio::select! {
                _ = emitter.canceled() => {}
                changed = seq_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    fn start_replication(
        &self,
        direction: Direction,
        source: Arc<dyn RemoteDatabase>,
        target: Arc<dyn RemoteDatabase>,
        options: ReplicationOptions,
    ) -> StorageResult<ReplicationStream> {
        self.ensure_alive(&self.lock())?;
        let (stream, emitter) = ReplicationStream::channel(direction, options);
        info!(
            "Starting {} replication {} -> {} (live={}, retry={})",
            direction,
            source.name(),
            target.name(),
            options.live,
            options.retry
        );
        tokio::spawn(Replicator::new(direction, source, target, options, emitter).run());
        Ok(stream)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn set_schema(&self, schema: &[SchemaDefinition]) -> StorageResult<()> {
        let mut state = self.lock();
        self.ensure_alive(&state)?;
        state.schema = schema.to_vec();
        debug!("Schema on {} set to {} types", self.inner.name, schema.len());
        Ok(())
    }

    async fn find(&self, record_type: &str, query: FindQuery) -> StorageResult<RelationalPayload> {
        let state = self.lock();
        self.ensure_alive(&state)?;

        let lookup = |id: &str| {
            state
                .docs
                .get(&format_doc_id(record_type, id))
                .filter(|d| !d.deleted)
                .map(|d| d.body.clone())
        };
        let docs: Vec<RecordDocument> = match &query {
            FindQuery::All => {
                let prefix = format_doc_id(record_type, "");
                state
                    .docs
                    .range(prefix.clone()..)
                    .take_while(|(id, _)| id.starts_with(&prefix))
                    .filter(|(_, d)| !d.deleted)
                    .map(|(_, d)| d.body.clone())
                    .collect()
            }
            FindQuery::One(id) => lookup(id).into_iter().collect(),
            FindQuery::Many(ids) => ids.iter().filter_map(|id| lookup(id)).collect(),
        };

        let plural = Self::plural_for(&state, record_type);
        let mut payload = RelationalPayload::new().with(plural, docs.clone());
        Self::sideload(&state, record_type, &docs, &mut payload);
        Ok(payload)
    }

    async fn save(&self, record_type: &str, mut doc: RecordDocument) -> StorageResult<RecordDocument> {
        self.ensure_writable()?;
        let mut state = self.lock();
        self.ensure_alive(&state)?;

        let id = match doc.id() {
            Some(id) => id.to_string(),
            None => {
                let id = generate_record_id();
                doc.set_id(id.clone());
                id
            }
        };
        let doc_id = format_doc_id(record_type, &id);
        let incoming = doc.revision()?;

        let rev = match (state.docs.get(&doc_id), incoming) {
            (Some(existing), Some(rev)) if !existing.deleted && existing.rev == rev => {
                existing.rev.next()
            }
            (Some(existing), None) if existing.deleted => existing.rev.next(),
            (None, None) => Revision::first(),
            _ => return Err(StorageError::Conflict(doc_id)),
        };

        doc.set_rev(&rev);
        self.commit(&mut state, doc_id, rev, false, doc.clone());
        Ok(doc)
    }

    async fn delete(&self, record_type: &str, doc: RecordDocument) -> StorageResult<DeleteResult> {
        self.ensure_writable()?;
        let mut state = self.lock();
        self.ensure_alive(&state)?;

        let id = doc
            .id()
            .ok_or_else(|| StorageError::InvalidDocument("missing id".into()))?
            .to_string();
        let doc_id = format_doc_id(record_type, &id);
        let rev = doc
            .revision()?
            .ok_or_else(|| StorageError::InvalidDocument(format!("{doc_id} has no rev")))?;

        let existing = state
            .docs
            .get(&doc_id)
            .filter(|d| !d.deleted)
            .ok_or_else(|| StorageError::NotFound(doc_id.clone()))?;
        if existing.rev != rev {
            return Err(StorageError::Conflict(doc_id));
        }

        let new_rev = rev.next();
        let mut tombstone = RecordDocument::new();
        tombstone.set_id(id.clone());
        tombstone.set_rev(&new_rev);
        self.commit(&mut state, doc_id, new_rev.clone(), true, tombstone);

        Ok(DeleteResult {
            ok: true,
            id,
            rev: new_rev.to_string(),
        })
    }

    async fn destroy(&self) -> StorageResult<()> {
        {
            let mut state = self.lock();
            state.docs.clear();
            state.schema.clear();
            state.destroyed = true;
        }
        info!("Destroyed store {}", self.inner.name);
        self.inner.seq_tx.send_modify(|_| {});
        Ok(())
    }

    async fn replicate_to(
        &self,
        remote: Arc<dyn RemoteDatabase>,
        options: ReplicationOptions,
    ) -> StorageResult<ReplicationStream> {
        self.start_replication(Direction::Outbound, Arc::new(self.clone()), remote, options)
    }

    async fn replicate_from(
        &self,
        remote: Arc<dyn RemoteDatabase>,
        options: ReplicationOptions,
    ) -> StorageResult<ReplicationStream> {
        self.start_replication(Direction::Inbound, remote, Arc::new(self.clone()), options)
    }
}

#[async_trait]
impl RemoteDatabase for MemoryStore {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn changes(&self, options: ChangesOptions) -> StorageResult<ChangeFeed> {
        self.ensure_online()?;
        let since = {
            let state = self.lock();
            self.ensure_alive(&state)?;
            match options.since {
                Since::Beginning => 0,
                Since::Now => state.update_seq,
                Since::Seq(seq) => seq,
            }
        };
        let (feed, emitter) = ChangeFeed::channel(options);
        tokio::spawn(self.clone().run_changes_feed(since, options, emitter));
        Ok(feed)
    }

    async fn apply_revisions(&self, changes: Vec<DocumentChange>) -> StorageResult<Vec<WriteOutcome>> {
        self.ensure_online()?;
        let read_only = self.ensure_writable().err();
        let mut state = self.lock();
        self.ensure_alive(&state)?;

        let mut outcomes = Vec::with_capacity(changes.len());
        for change in changes {
            if let Some(denied) = &read_only {
                outcomes.push(WriteOutcome::Denied(denied.to_string()));
                continue;
            }
            let Some(rev) = change.rev.as_deref().and_then(|r| r.parse::<Revision>().ok()) else {
                outcomes.push(WriteOutcome::Skipped);
                continue;
            };
            if state.docs.get(&change.id).is_some_and(|d| d.rev >= rev) {
                outcomes.push(WriteOutcome::Skipped);
                continue;
            }
            let body = match change.doc {
                Some(doc) => doc,
                None if change.deleted => {
                    let mut tombstone = RecordDocument::new();
                    if let Some(id) = ParsedDocId::parse(&change.id).id {
                        tombstone.insert(ID_FIELD, Value::String(id));
                    }
                    tombstone.set_rev(&rev);
                    tombstone
                }
                None => {
                    outcomes.push(WriteOutcome::Skipped);
                    continue;
                }
            };
            self.commit(&mut state, change.id, rev, change.deleted, body);
            outcomes.push(WriteOutcome::Written);
        }
        Ok(outcomes)
    }
}
