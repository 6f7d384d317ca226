//! Replication coordinator.
//!
//! Owns the two directional replication streams and the change listener of
//! one adapter. A pump task per stream consumes store events, drives the
//! per-direction [`ReplicationPhase`], re-publishes lifecycle events on the
//! [`EventBus`] and turns inbound document changes into cache evictions and
//! reloads.
//!
//! Starting and stopping are cheap and never wait for the streams: stop only
//! requests cancellation and the stream later reports `complete`. A session
//! whose streams both end on their own (one-shot runs, non-retrying
//! failures) frees its slot, so the next start succeeds without a stop.

use crate::cache::RecordCache;
use crate::error::{SyncError, SyncResult};
use crate::events::{AdapterEvent, EventBus};
use crate::phase::ReplicationPhase;
use relsync_storage::{
    CancelHandle, ChangeBatch, ChangeFeed, ChangesEvent, ChangesOptions, Direction,
    DocumentStore, RemoteDatabase, ReplicationEvent, ReplicationOptions, ReplicationStream, Since,
};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Occupancy of a session slot.
#[derive(Debug)]
enum Slot<T> {
    Idle,
    /// Reserved by a start that is still opening streams.
    Starting(u64),
    Running { session: u64, handles: T },
}

#[derive(Debug)]
struct ReplicationHandles {
    outbound: CancelHandle,
    inbound: CancelHandle,
}

impl ReplicationHandles {
    fn cancel(&self) {
        self.outbound.cancel();
        self.inbound.cancel();
    }
}

/// Coordinates replication between a local store and its remote.
pub struct ReplicationCoordinator {
    store: Arc<dyn DocumentStore>,
    remote: Arc<dyn RemoteDatabase>,
    cache: Arc<dyn RecordCache>,
    events: Arc<EventBus>,
    outbound_phase: Arc<watch::Sender<ReplicationPhase>>,
    inbound_phase: Arc<watch::Sender<ReplicationPhase>>,
    /// Session whose pumps may still drive the phases. Pumps of an older,
    /// stopped session keep publishing events but leave the phases alone.
    phase_owner: Arc<AtomicU64>,
    next_session: AtomicU64,
    replication: Arc<Mutex<Slot<ReplicationHandles>>>,
    listener: Mutex<Slot<CancelHandle>>,
}

impl ReplicationCoordinator {
    /// Creates a coordinator with its own event bus.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        remote: Arc<dyn RemoteDatabase>,
        cache: Arc<dyn RecordCache>,
    ) -> Self {
        Self::with_events(store, remote, cache, Arc::new(EventBus::new()))
    }

    /// Creates a coordinator publishing on an existing event bus.
    pub fn with_events(
        store: Arc<dyn DocumentStore>,
        remote: Arc<dyn RemoteDatabase>,
        cache: Arc<dyn RecordCache>,
        events: Arc<EventBus>,
    ) -> Self {
        let (outbound_phase, _) = watch::channel(ReplicationPhase::Idle);
        let (inbound_phase, _) = watch::channel(ReplicationPhase::Idle);
        Self {
            store,
            remote,
            cache,
            events,
            outbound_phase: Arc::new(outbound_phase),
            inbound_phase: Arc::new(inbound_phase),
            phase_owner: Arc::new(AtomicU64::new(0)),
            next_session: AtomicU64::new(0),
            replication: Arc::new(Mutex::new(Slot::Idle)),
            listener: Mutex::new(Slot::Idle),
        }
    }

    /// The bus lifecycle events are published on.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Current phase of one direction.
    pub fn phase(&self, direction: Direction) -> ReplicationPhase {
        *self.phase_tx(direction).borrow()
    }

    /// Watches the phase of one direction.
    pub fn phase_receiver(&self, direction: Direction) -> watch::Receiver<ReplicationPhase> {
        self.phase_tx(direction).subscribe()
    }

    /// Whether a replication session is starting or running.
    pub fn is_replicating(&self) -> bool {
        !matches!(*lock(&self.replication), Slot::Idle)
    }

    /// Whether the change listener is starting or running.
    pub fn is_listening(&self) -> bool {
        !matches!(*lock(&self.listener), Slot::Idle)
    }

    // ── Replication ─────────────────────────────────────────────

    /// Starts one outbound and one inbound stream against the remote.
    ///
    /// Both streams share `live_retry` for their live and retry flags. Fails
    /// with [`SyncError::AlreadyRunning`] if a session is already running;
    /// nothing is opened in that case.
    pub async fn start_replication(&self, live_retry: bool) -> SyncResult<()> {
        let session = self.reserve(&self.replication, "replication")?;
        self.phase_owner.store(session, Ordering::SeqCst);
        for direction in Direction::ALL {
            self.phase_tx(direction).send_replace(ReplicationPhase::Connecting);
        }
        info!(
            "Starting replication with {} (live_retry={})",
            self.remote.name(),
            live_retry
        );

        let options = ReplicationOptions::live_retry(live_retry);
        let outbound = match self
            .store
            .replicate_to(Arc::clone(&self.remote), options)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to open outbound replication: {}", e);
                self.abort_start(session);
                return Err(e.into());
            }
        };
        let inbound = match self
            .store
            .replicate_from(Arc::clone(&self.remote), options)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to open inbound replication: {}", e);
                outbound.cancel();
                self.abort_start(session);
                return Err(e.into());
            }
        };

        let handles = ReplicationHandles {
            outbound: outbound.cancel_handle(),
            inbound: inbound.cancel_handle(),
        };
        let live_pumps = Arc::new(AtomicUsize::new(2));
        self.spawn_replication_pump(session, outbound, Arc::clone(&live_pumps));
        self.spawn_replication_pump(session, inbound, live_pumps);

        if let Err(handles) = install(&self.replication, session, handles) {
            debug!("Replication stopped or ended while starting, canceling its streams");
            handles.cancel();
        }
        Ok(())
    }

    /// Cancels both replication streams. A no-op if none are running.
    pub fn stop_replication(&self) -> SyncResult<()> {
        match take(&self.replication) {
            Slot::Running { handles, .. } => {
                info!("Stopping replication with {}", self.remote.name());
                handles.cancel();
                self.mark_canceled();
            }
            Slot::Starting(_) => {
                info!("Stopping replication with {} while it starts", self.remote.name());
                self.mark_canceled();
            }
            Slot::Idle => debug!("stop_replication: replication is not running"),
        }
        Ok(())
    }

    // ── Change listener ─────────────────────────────────────────

    /// Listens to the remote's changes from now on, publishing each as a
    /// [`AdapterEvent::ChangesChange`]. Has no cache side effects.
    ///
    /// The listener slot stays occupied until
    /// [`stop_listen_changes`](Self::stop_listen_changes), even if the feed
    /// ended with an error.
    pub async fn start_listen_changes(&self, include_docs: bool) -> SyncResult<()> {
        let session = self.reserve(&self.listener, "change listener")?;
        let options = ChangesOptions {
            since: Since::Now,
            live: true,
            include_docs,
        };
        let feed = match self.remote.changes(options).await {
            Ok(feed) => feed,
            Err(e) => {
                warn!("Failed to open change feed on {}: {}", self.remote.name(), e);
                release(&self.listener, session);
                return Err(e.into());
            }
        };
        info!(
            "Listening to changes on {} (include_docs={})",
            self.remote.name(),
            include_docs
        );

        let cancel = feed.cancel_handle();
        tokio::spawn(pump_changes(feed, Arc::clone(&self.events)));
        if let Err(cancel) = install(&self.listener, session, cancel) {
            debug!("Change listener stopped while starting, canceling it");
            cancel.cancel();
        }
        Ok(())
    }

    /// Cancels the change listener. A no-op if it is not running.
    pub fn stop_listen_changes(&self) -> SyncResult<()> {
        match take(&self.listener) {
            Slot::Running { handles, .. } => {
                info!("Stopping change listener on {}", self.remote.name());
                handles.cancel();
            }
            Slot::Starting(_) => info!("Stopping change listener while it starts"),
            Slot::Idle => debug!("stop_listen_changes: listener is not running"),
        }
        Ok(())
    }

    // ── Teardown ────────────────────────────────────────────────

    /// Cancels everything still running without waiting for completion.
    pub fn shutdown(&self) {
        let replication = take(&self.replication);
        let listener = take(&self.listener);
        if matches!(replication, Slot::Idle) && matches!(listener, Slot::Idle) {
            return;
        }
        info!("Shutting down replication coordinator for {}", self.store.name());

        if let Slot::Running { handles, .. } = &replication {
            handles.cancel();
        }
        if !matches!(replication, Slot::Idle) {
            self.mark_canceled();
        }
        if let Slot::Running { handles, .. } = &listener {
            handles.cancel();
        }
    }

    // ── Internals ───────────────────────────────────────────────

    fn phase_tx(&self, direction: Direction) -> &Arc<watch::Sender<ReplicationPhase>> {
        match direction {
            Direction::Outbound => &self.outbound_phase,
            Direction::Inbound => &self.inbound_phase,
        }
    }

    fn reserve<T>(&self, slot: &Mutex<Slot<T>>, what: &'static str) -> SyncResult<u64> {
        let mut slot = lock(slot);
        if !matches!(*slot, Slot::Idle) {
            warn!("Ignoring start: {} is already running", what);
            return Err(SyncError::AlreadyRunning(what));
        }
        let session = self.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        *slot = Slot::Starting(session);
        Ok(session)
    }

    fn abort_start(&self, session: u64) {
        release(&self.replication, session);
        if self.phase_owner.load(Ordering::SeqCst) == session {
            for direction in Direction::ALL {
                self.phase_tx(direction).send_replace(ReplicationPhase::Idle);
            }
        }
    }

    fn mark_canceled(&self) {
        for direction in Direction::ALL {
            self.phase_tx(direction).send_if_modified(|phase| {
                let next = phase.on_cancel();
                let changed = next != *phase;
                *phase = next;
                changed
            });
        }
    }

    fn spawn_replication_pump(
        &self,
        session: u64,
        stream: ReplicationStream,
        live_pumps: Arc<AtomicUsize>,
    ) {
        let direction = stream.direction();
        let pump = ReplicationPump {
            direction,
            session,
            live_pumps,
            slot: Arc::clone(&self.replication),
            phase_owner: Arc::clone(&self.phase_owner),
            phase: Arc::clone(self.phase_tx(direction)),
            events: Arc::clone(&self.events),
            cache: Arc::clone(&self.cache),
            store: Arc::clone(&self.store),
        };
        tokio::spawn(pump.run(stream));
    }
}

impl Drop for ReplicationCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ReplicationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationCoordinator")
            .field("store", &self.store.name())
            .field("remote", &self.remote.name())
            .field("outbound", &self.phase(Direction::Outbound))
            .field("inbound", &self.phase(Direction::Inbound))
            .finish()
    }
}

/// Consumes one replication stream.
struct ReplicationPump {
    direction: Direction,
    session: u64,
    /// Pumps of this session still consuming their stream.
    live_pumps: Arc<AtomicUsize>,
    slot: Arc<Mutex<Slot<ReplicationHandles>>>,
    phase_owner: Arc<AtomicU64>,
    phase: Arc<watch::Sender<ReplicationPhase>>,
    events: Arc<EventBus>,
    cache: Arc<dyn RecordCache>,
    store: Arc<dyn DocumentStore>,
}

impl ReplicationPump {
    async fn run(self, mut stream: ReplicationStream) {
        let direction = self.direction;
        while let Some(event) = stream.recv().await {
            self.advance_phase(&event);
            let done = matches!(event, ReplicationEvent::Complete(_));
            match event {
                ReplicationEvent::Change(batch) => match direction {
                    Direction::Inbound => self.on_from_change(&batch),
                    Direction::Outbound => self.on_to_change(&batch),
                },
                ReplicationEvent::Paused(err) => {
                    self.events
                        .emit(&AdapterEvent::ReplicationPaused { direction, err });
                }
                ReplicationEvent::Active => {
                    self.events.emit(&AdapterEvent::ReplicationActive { direction });
                }
                ReplicationEvent::Denied(err) => {
                    warn!("{} replication denied: {}", direction, err);
                    self.events
                        .emit(&AdapterEvent::ReplicationDenied { direction, err });
                }
                ReplicationEvent::Complete(info) => {
                    info!(
                        "{} replication complete (canceled={}, written={})",
                        direction, info.canceled, info.docs_written
                    );
                    self.events
                        .emit(&AdapterEvent::ReplicationComplete { direction, info });
                }
                ReplicationEvent::Error(err) => {
                    warn!("{} replication error: {}", direction, err);
                    self.events
                        .emit(&AdapterEvent::ReplicationError { direction, err });
                }
            }
            if done {
                break;
            }
        }
        debug!("{} replication pump finished", direction);

        if self.live_pumps.fetch_sub(1, Ordering::SeqCst) == 1 {
            finish(&self.slot, self.session);
        }
    }

    fn advance_phase(&self, event: &ReplicationEvent) {
        if self.phase_owner.load(Ordering::SeqCst) != self.session {
            return;
        }
        let direction = self.direction;
        self.phase.send_if_modified(|phase| {
            let next = phase.on_event(event);
            if next == *phase {
                return false;
            }
            debug!("{} replication phase {} -> {}", direction, phase, next);
            *phase = next;
            true
        });
    }

    /// Evicts records deleted remotely and reloads records changed remotely.
    fn on_from_change(&self, batch: &ChangeBatch) {
        for change in &batch.docs {
            let Some(key) = self.store.parse_doc_id(&change.id).into_key() else {
                debug!("Ignoring non-relational change {}", change.id);
                continue;
            };

            if change.deleted {
                match self.cache.peek(&key) {
                    Some(record) if !record.is_deleted => {
                        debug!("Unloading {} after remote deletion", key);
                        self.cache.unload(&key);
                    }
                    _ => {}
                }
                continue;
            }

            let cache = Arc::clone(&self.cache);
            tokio::spawn(async move {
                if let Err(e) = cache.find_record(&key).await {
                    warn!("Failed to reload {}: {}", key, e);
                }
            });
        }
    }

    fn on_to_change(&self, batch: &ChangeBatch) {
        debug!(
            "Pushed {} documents to remote (seq {})",
            batch.docs_written, batch.last_seq
        );
    }
}

async fn pump_changes(mut feed: ChangeFeed, events: Arc<EventBus>) {
    while let Some(event) = feed.recv().await {
        match event {
            ChangesEvent::Change(change) => {
                events.emit(&AdapterEvent::ChangesChange { change });
            }
            ChangesEvent::Complete(info) => {
                debug!("Change feed complete at seq {}", info.last_seq);
                events.emit(&AdapterEvent::ChangesComplete { info });
                break;
            }
            ChangesEvent::Error(err) => {
                warn!("Change feed error: {}", err);
                events.emit(&AdapterEvent::ChangesError { err });
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Moves a reserved slot to running. Hands the handles back if the
/// reservation was withdrawn meanwhile.
fn install<T>(slot: &Mutex<Slot<T>>, session: u64, handles: T) -> Result<(), T> {
    let mut slot = lock(slot);
    match *slot {
        Slot::Starting(reserved) if reserved == session => {
            *slot = Slot::Running { session, handles };
            Ok(())
        }
        _ => Err(handles),
    }
}

fn release<T>(slot: &Mutex<Slot<T>>, session: u64) {
    let mut slot = lock(slot);
    if matches!(*slot, Slot::Starting(reserved) if reserved == session) {
        *slot = Slot::Idle;
    }
}

/// Frees a slot whose session ended on its own. Leaves newer sessions alone.
fn finish<T>(slot: &Mutex<Slot<T>>, session: u64) {
    let mut slot = lock(slot);
    let ended = match &*slot {
        Slot::Starting(reserved) => *reserved == session,
        Slot::Running { session: running, .. } => *running == session,
        Slot::Idle => false,
    };
    if ended {
        debug!("Replication session {} ended, slot released", session);
        *slot = Slot::Idle;
    }
}

fn take<T>(slot: &Mutex<Slot<T>>) -> Slot<T> {
    std::mem::replace(&mut *lock(slot), Slot::Idle)
}
