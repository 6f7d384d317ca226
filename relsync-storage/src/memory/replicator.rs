//! Replication task shared by both directions.
//!
//! A replicator reads the source's change feed from the last replicated
//! sequence, writes batches to the target with their original revisions and
//! reports progress on its [`ReplicationStream`](crate::ReplicationStream).
//! Failures either end the stream or, with `retry`, reopen the feed after an
//! exponential backoff.

use crate::changes::{ChangesEvent, ChangesOptions, Since};
use crate::replication::{
    ChangeBatch, Direction, ReplicationEvent, ReplicationInfo, ReplicationOptions, StreamError,
};
use crate::store::{RemoteDatabase, WriteOutcome};
use crate::stream::{CancelHandle, StreamEmitter};
use relsync_types::DocumentChange;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver};
use tracing::{debug, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_millis(50);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// How one feed session ended.
#[derive(Debug)]
enum SessionEnd {
    /// The source feed finished (non-live).
    Completed,
    /// Cancellation was requested.
    Canceled,
    /// Nobody is listening anymore.
    Closed,
    Failed(StreamError),
}

/// Receiving half of a source feed. Dropping it cancels the feed.
struct FeedReceiver {
    events: UnboundedReceiver<ChangesEvent>,
    cancel: CancelHandle,
}

impl Drop for FeedReceiver {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub(super) struct Replicator {
    direction: Direction,
    source: Arc<dyn RemoteDatabase>,
    target: Arc<dyn RemoteDatabase>,
    options: ReplicationOptions,
    emitter: StreamEmitter<ReplicationEvent>,
    info: ReplicationInfo,
}

impl Replicator {
    pub(super) fn new(
        direction: Direction,
        source: Arc<dyn RemoteDatabase>,
        target: Arc<dyn RemoteDatabase>,
        options: ReplicationOptions,
        emitter: StreamEmitter<ReplicationEvent>,
    ) -> Self {
        Self {
            direction,
            source,
            target,
            options,
            emitter,
            info: ReplicationInfo::default(),
        }
    }

    pub(super) async fn run(mut self) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            let err = match self.session(&mut backoff).await {
                SessionEnd::Completed => return self.finish(false),
                SessionEnd::Canceled => return self.finish(true),
                SessionEnd::Closed => {
                    debug!("{} replication stream dropped by consumer", self.direction);
                    return;
                }
                SessionEnd::Failed(err) => err,
            };

            if !self.options.retry {
                warn!("{} replication failed: {}", self.direction, err);
                self.info.errors.push(err.clone());
                self.emitter.emit(ReplicationEvent::Error(err));
                return;
            }

            warn!(
                "{} replication interrupted, retrying in {:?}: {}",
                self.direction, backoff, err
            );
            if !self.emitter.emit(ReplicationEvent::Paused(Some(err))) {
                return;
            }
            tokio::select! {
                _ = self.emitter.canceled() => return self.finish(true),
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    /// Catches up on the source's backlog, then (when live) follows it.
    async fn session(&mut self, backoff: &mut Duration) -> SessionEnd {
        if self.emitter.is_canceled() {
            return SessionEnd::Canceled;
        }
        let mut backlog = match self.open_feed(false).await {
            Ok(feed) => feed,
            Err(err) => return SessionEnd::Failed(err),
        };
        *backoff = INITIAL_BACKOFF;

        if !self.emitter.emit(ReplicationEvent::Active) {
            return SessionEnd::Closed;
        }
        match self.pump(&mut backlog, false).await {
            SessionEnd::Completed => {}
            other => return other,
        }
        if !self.options.live {
            return SessionEnd::Completed;
        }

        if !self.emitter.emit(ReplicationEvent::Paused(None)) {
            return SessionEnd::Closed;
        }
        let mut live = match self.open_feed(true).await {
            Ok(feed) => feed,
            Err(err) => return SessionEnd::Failed(err),
        };
        self.pump(&mut live, true).await
    }

    async fn open_feed(&self, live: bool) -> Result<FeedReceiver, StreamError> {
        let feed = self
            .source
            .changes(ChangesOptions {
                since: Since::Seq(self.info.last_seq),
                live,
                include_docs: true,
            })
            .await?;
        let (events, cancel) = feed.into_handle().into_parts();
        Ok(FeedReceiver { events, cancel })
    }

    /// Writes feed batches until the feed ends. In live mode the stream
    /// starts out caught up and pauses again whenever the feed runs dry.
    async fn pump(&mut self, feed: &mut FeedReceiver, live: bool) -> SessionEnd {
        let events = &mut feed.events;
        let mut caught_up = live;
        loop {
            let event = match events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => {
                    if live && !caught_up {
                        caught_up = true;
                        if !self.emitter.emit(ReplicationEvent::Paused(None)) {
                            return SessionEnd::Closed;
                        }
                    }
                    tokio::select! {
                        _ = self.emitter.canceled() => return SessionEnd::Canceled,
                        event = events.recv() => match event {
                            Some(event) => event,
                            None => return SessionEnd::Failed(feed_closed()),
                        },
                    }
                }
                Err(TryRecvError::Disconnected) => return SessionEnd::Failed(feed_closed()),
            };
            if self.emitter.is_canceled() {
                return SessionEnd::Canceled;
            }

            let first = match event {
                ChangesEvent::Change(change) => change,
                ChangesEvent::Complete(_) => return SessionEnd::Completed,
                ChangesEvent::Error(err) => return SessionEnd::Failed(err),
            };

            let mut batch = vec![first];
            let mut deferred = None;
            while batch.len() < self.options.batch_size.max(1) {
                match events.try_recv() {
                    Ok(ChangesEvent::Change(change)) => batch.push(change),
                    Ok(other) => {
                        deferred = Some(other);
                        break;
                    }
                    Err(_) => break,
                }
            }

            if caught_up {
                caught_up = false;
                if !self.emitter.emit(ReplicationEvent::Active) {
                    return SessionEnd::Closed;
                }
            }
            if let Err(end) = self.write_batch(batch).await {
                return end;
            }

            match deferred {
                Some(ChangesEvent::Complete(_)) => return SessionEnd::Completed,
                Some(ChangesEvent::Error(err)) => return SessionEnd::Failed(err),
                Some(ChangesEvent::Change(_)) | None => {}
            }
        }
    }

    async fn write_batch(&mut self, batch: Vec<DocumentChange>) -> Result<(), SessionEnd> {
        let read = batch.len() as u64;
        let last_seq = batch.last().map_or(self.info.last_seq, |c| c.seq);
        let outcomes = self
            .target
            .apply_revisions(batch.clone())
            .await
            .map_err(|e| SessionEnd::Failed(e.into()))?;

        let mut written = Vec::with_capacity(batch.len());
        for (change, outcome) in batch.into_iter().zip(outcomes) {
            match outcome {
                WriteOutcome::Written => written.push(change),
                WriteOutcome::Skipped => {}
                WriteOutcome::Denied(reason) => {
                    self.info.doc_write_failures += 1;
                    let err = StreamError {
                        status: Some(403),
                        name: "forbidden".into(),
                        message: format!("{}: {}", change.id, reason),
                    };
                    if !self.emitter.emit(ReplicationEvent::Denied(err)) {
                        return Err(SessionEnd::Closed);
                    }
                }
            }
        }

        let docs_written = written.len() as u64;
        self.info.docs_read += read;
        self.info.docs_written += docs_written;
        self.info.last_seq = last_seq;
        debug!(
            "{} replication {} -> {}: read {}, wrote {}, seq {}",
            self.direction,
            self.source.name(),
            self.target.name(),
            read,
            docs_written,
            last_seq
        );

        if written.is_empty() {
            return Ok(());
        }
        let batch = ChangeBatch {
            docs: written,
            docs_read: read,
            docs_written,
            last_seq,
        };
        if !self.emitter.emit(ReplicationEvent::Change(batch)) {
            return Err(SessionEnd::Closed);
        }
        Ok(())
    }

    fn finish(mut self, canceled: bool) {
        self.info.ok = self.info.errors.is_empty();
        self.info.canceled = canceled;
        info!(
            "{} replication {} -> {} complete (canceled={}, written={})",
            self.direction,
            self.source.name(),
            self.target.name(),
            canceled,
            self.info.docs_written
        );
        self.emitter.emit(ReplicationEvent::Complete(self.info));
    }
}

fn feed_closed() -> StreamError {
    StreamError::new("channel_closed", "change feed closed unexpectedly")
}
