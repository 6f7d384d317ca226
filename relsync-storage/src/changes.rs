//! Change feed types.

use crate::replication::StreamError;
use crate::stream::{CancelHandle, StreamEmitter, StreamHandle};
use relsync_types::DocumentChange;
use serde::{Deserialize, Serialize};

/// Where a change feed starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Since {
    /// From the first change ever recorded.
    Beginning,
    /// From the store's current sequence: only changes made after opening.
    #[default]
    Now,
    /// After the given sequence number.
    Seq(u64),
}

/// Options for a change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesOptions {
    pub since: Since,
    /// Keep the feed open for future changes.
    pub live: bool,
    /// Attach full document bodies to each change.
    pub include_docs: bool,
}

impl Default for ChangesOptions {
    fn default() -> Self {
        Self {
            since: Since::Now,
            live: true,
            include_docs: false,
        }
    }
}

/// Summary delivered when a change feed completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangesInfo {
    pub last_seq: u64,
    pub canceled: bool,
}

/// Events emitted by a change feed.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangesEvent {
    Change(DocumentChange),
    Complete(ChangesInfo),
    Error(StreamError),
}

/// A live change listener.
#[derive(Debug)]
pub struct ChangeFeed {
    options: ChangesOptions,
    handle: StreamHandle<ChangesEvent>,
}

impl ChangeFeed {
    /// Creates a feed and the emitter its producer drives.
    pub fn channel(options: ChangesOptions) -> (Self, StreamEmitter<ChangesEvent>) {
        let (handle, emitter) = StreamHandle::channel();
        (Self { options, handle }, emitter)
    }

    /// The options the feed was opened with.
    pub fn options(&self) -> ChangesOptions {
        self.options
    }

    /// Receives the next event.
    pub async fn recv(&mut self) -> Option<ChangesEvent> {
        self.handle.recv().await
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Returns a cancel switch that outlives the feed.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.cancel_handle()
    }

    /// Unwraps the underlying handle.
    pub fn into_handle(self) -> StreamHandle<ChangesEvent> {
        self.handle
    }
}
