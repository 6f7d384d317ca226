//! Replication stream types.

use crate::error::StorageError;
use crate::stream::{CancelHandle, StreamEmitter, StreamHandle};
use relsync_types::DocumentChange;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a replication stream relative to the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Local → remote (push).
    Outbound,
    /// Remote → local (pull).
    Inbound,
}

impl Direction {
    /// Both directions, outbound first.
    pub const ALL: [Direction; 2] = [Direction::Outbound, Direction::Inbound];
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Outbound => write!(f, "outbound"),
            Direction::Inbound => write!(f, "inbound"),
        }
    }
}

/// Options for a replication stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationOptions {
    /// Keep replicating new changes after catching up.
    pub live: bool,
    /// Reconnect with backoff after failures instead of erroring out.
    pub retry: bool,
    /// Maximum documents written per batch.
    pub batch_size: usize,
}

impl ReplicationOptions {
    /// Live and retrying (or neither).
    pub fn live_retry(enabled: bool) -> Self {
        Self {
            live: enabled,
            retry: enabled,
            ..Self::default()
        }
    }
}

impl Default for ReplicationOptions {
    fn default() -> Self {
        Self {
            live: true,
            retry: true,
            batch_size: 100,
        }
    }
}

/// A stream-level failure, delivered as an event rather than returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{name}: {message}")]
pub struct StreamError {
    /// HTTP-like status, when the failure maps onto one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub name: String,
    pub message: String,
}

impl StreamError {
    /// Creates an error without a status.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: None,
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<&StorageError> for StreamError {
    fn from(e: &StorageError) -> Self {
        let (status, name) = match e {
            StorageError::NotFound(_) => (Some(404), "not_found"),
            StorageError::Conflict(_) => (Some(409), "conflict"),
            StorageError::InvalidDocument(_) => (Some(400), "bad_request"),
            StorageError::Unauthorized(_) => (Some(403), "forbidden"),
            StorageError::Offline(_) => (None, "offline"),
            StorageError::Destroyed(_) => (None, "destroyed"),
            StorageError::Serialization(_) => (None, "serialization"),
            StorageError::ChannelClosed => (None, "channel_closed"),
        };
        Self {
            status,
            name: name.to_string(),
            message: e.to_string(),
        }
    }
}

impl From<StorageError> for StreamError {
    fn from(e: StorageError) -> Self {
        Self::from(&e)
    }
}

/// A batch of documents written by one replication step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeBatch {
    pub docs: Vec<DocumentChange>,
    pub docs_read: u64,
    pub docs_written: u64,
    /// Source sequence reached by this batch.
    pub last_seq: u64,
}

/// Summary delivered when a replication stream completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplicationInfo {
    pub ok: bool,
    pub canceled: bool,
    pub docs_read: u64,
    pub docs_written: u64,
    pub doc_write_failures: u64,
    pub last_seq: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<StreamError>,
}

/// Events emitted by a replication stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicationEvent {
    /// A batch was written to the target.
    Change(ChangeBatch),
    /// Caught up (`None`) or waiting to retry after a failure (`Some`).
    Paused(Option<StreamError>),
    /// Replicating again after a pause.
    Active,
    /// A document write was rejected by the target.
    Denied(StreamError),
    /// The stream finished or was canceled.
    Complete(ReplicationInfo),
    /// The stream failed and will not retry.
    Error(StreamError),
}

/// One directional replication stream.
#[derive(Debug)]
pub struct ReplicationStream {
    direction: Direction,
    options: ReplicationOptions,
    handle: StreamHandle<ReplicationEvent>,
}

impl ReplicationStream {
    /// Creates a stream and the emitter its producer drives.
    pub fn channel(
        direction: Direction,
        options: ReplicationOptions,
    ) -> (Self, StreamEmitter<ReplicationEvent>) {
        let (handle, emitter) = StreamHandle::channel();
        (
            Self {
                direction,
                options,
                handle,
            },
            emitter,
        )
    }

    /// The stream's direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The options the stream was opened with.
    pub fn options(&self) -> ReplicationOptions {
        self.options
    }

    /// Receives the next event.
    pub async fn recv(&mut self) -> Option<ReplicationEvent> {
        self.handle.recv().await
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Returns a cancel switch that outlives the stream.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.cancel_handle()
    }

    /// Unwraps the underlying handle.
    pub fn into_handle(self) -> StreamHandle<ReplicationEvent> {
        self.handle
    }
}
