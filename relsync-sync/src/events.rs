//! Adapter lifecycle events and their dispatch.
//!
//! Every replication or change-feed event the coordinator observes is
//! re-published on an [`EventBus`] under a stable name. Events carry the
//! direction that produced them, but subscriptions are by name only, so a
//! listener for [`EventKind::ReplicationPaused`] hears pauses from either
//! stream.

use relsync_storage::{ChangesInfo, Direction, ReplicationInfo, StreamError};
use relsync_types::DocumentChange;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Names of the events an adapter emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    ReplicationError,
    ReplicationPaused,
    ReplicationActive,
    ReplicationDenied,
    ReplicationComplete,
    ChangesChange,
    ChangesComplete,
    ChangesError,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::ReplicationError,
        EventKind::ReplicationPaused,
        EventKind::ReplicationActive,
        EventKind::ReplicationDenied,
        EventKind::ReplicationComplete,
        EventKind::ChangesChange,
        EventKind::ChangesComplete,
        EventKind::ChangesError,
    ];

    /// The event's wire name.
    pub fn name(self) -> &'static str {
        match self {
            EventKind::ReplicationError => "ReplicationError",
            EventKind::ReplicationPaused => "ReplicationPaused",
            EventKind::ReplicationActive => "ReplicationActive",
            EventKind::ReplicationDenied => "ReplicationDenied",
            EventKind::ReplicationComplete => "ReplicationComplete",
            EventKind::ChangesChange => "ChangesChange",
            EventKind::ChangesComplete => "ChangesComplete",
            EventKind::ChangesError => "ChangesError",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown event: {s}"))
    }
}

/// An event published by the adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    ReplicationError {
        direction: Direction,
        err: StreamError,
    },
    /// Caught up, or waiting to retry when `err` is set.
    ReplicationPaused {
        direction: Direction,
        err: Option<StreamError>,
    },
    ReplicationActive {
        direction: Direction,
    },
    ReplicationDenied {
        direction: Direction,
        err: StreamError,
    },
    ReplicationComplete {
        direction: Direction,
        info: ReplicationInfo,
    },
    ChangesChange {
        change: DocumentChange,
    },
    ChangesComplete {
        info: ChangesInfo,
    },
    ChangesError {
        err: StreamError,
    },
}

impl AdapterEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AdapterEvent::ReplicationError { .. } => EventKind::ReplicationError,
            AdapterEvent::ReplicationPaused { .. } => EventKind::ReplicationPaused,
            AdapterEvent::ReplicationActive { .. } => EventKind::ReplicationActive,
            AdapterEvent::ReplicationDenied { .. } => EventKind::ReplicationDenied,
            AdapterEvent::ReplicationComplete { .. } => EventKind::ReplicationComplete,
            AdapterEvent::ChangesChange { .. } => EventKind::ChangesChange,
            AdapterEvent::ChangesComplete { .. } => EventKind::ChangesComplete,
            AdapterEvent::ChangesError { .. } => EventKind::ChangesError,
        }
    }

    /// The replication stream that produced the event. `None` for
    /// change-feed events.
    pub fn direction(&self) -> Option<Direction> {
        match self {
            AdapterEvent::ReplicationError { direction, .. }
            | AdapterEvent::ReplicationPaused { direction, .. }
            | AdapterEvent::ReplicationActive { direction }
            | AdapterEvent::ReplicationDenied { direction, .. }
            | AdapterEvent::ReplicationComplete { direction, .. } => Some(*direction),
            AdapterEvent::ChangesChange { .. }
            | AdapterEvent::ChangesComplete { .. }
            | AdapterEvent::ChangesError { .. } => None,
        }
    }

    /// The error the event carries, if any.
    pub fn error(&self) -> Option<&StreamError> {
        match self {
            AdapterEvent::ReplicationError { err, .. }
            | AdapterEvent::ReplicationDenied { err, .. }
            | AdapterEvent::ChangesError { err } => Some(err),
            AdapterEvent::ReplicationPaused { err, .. } => err.as_ref(),
            _ => None,
        }
    }
}

/// A subscribed callback.
pub type Listener = Arc<dyn Fn(&AdapterEvent) + Send + Sync>;

/// Identifies a subscription for [`EventBus::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    /// `None` subscribes to every event.
    kind: Option<EventKind>,
    listener: Listener,
}

/// Synchronous, in-process event dispatch.
///
/// Listeners run on the emitting task, in subscription order. The listener
/// list is snapshotted before dispatch, so listeners may subscribe or
/// unsubscribe from inside a callback; such changes apply from the next
/// emit on.
#[derive(Default)]
pub struct EventBus {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to one kind of event.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&AdapterEvent) + Send + Sync + 'static,
    {
        self.subscribe(Some(kind), Arc::new(listener))
    }

    /// Subscribes to every event.
    pub fn on_any<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&AdapterEvent) + Send + Sync + 'static,
    {
        self.subscribe(None, Arc::new(listener))
    }

    /// Removes a subscription. Returns `false` if it was already gone.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut subs = self.lock();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Delivers an event to every matching listener.
    pub fn emit(&self, event: &AdapterEvent) {
        let kind = event.kind();
        let listeners: Vec<Listener> = self
            .lock()
            .iter()
            .filter(|s| s.kind.is_none_or(|k| k == kind))
            .map(|s| Arc::clone(&s.listener))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    /// Number of listeners an event of `kind` would reach, including
    /// catch-all listeners.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.lock()
            .iter()
            .filter(|s| s.kind.is_none_or(|k| k == kind))
            .count()
    }

    fn subscribe(&self, kind: Option<EventKind>, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Subscription { id, kind, listener });
        id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.lock().len())
            .finish()
    }
}
