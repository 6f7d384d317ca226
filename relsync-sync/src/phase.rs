//! Per-direction replication phase.
//!
//! # State Transitions
//!
//! ```text
//!            start                active               paused
//! Idle ───────────→ Connecting ──────────→ Active ←──────────→ Paused
//!                       │                    │                    │
//!                       │ error / denied     │ error / denied     │
//!                       ↓                    ↓                    ↓
//!                  Errored, Denied  (active / paused events resume the stream)
//!
//! any running phase ──cancel──→ Canceled ──complete──→ Stopped
//! any running phase ──complete───────────────────────→ Stopped
//! ```
//!
//! A stream whose store retries after an error keeps emitting `active` and
//! `paused`, and the phase follows. A denied document does not end the
//! stream either.

use relsync_storage::ReplicationEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of one replication stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReplicationPhase {
    /// Never started, or the start failed.
    #[default]
    Idle,
    /// Started, waiting for the first lifecycle event.
    Connecting,
    /// Transferring documents.
    Active,
    /// Caught up, or waiting to retry.
    Paused,
    /// The stream reported an error.
    Errored,
    /// A document write was denied.
    Denied,
    /// Cancellation requested; waiting for completion.
    Canceled,
    /// The stream completed.
    Stopped,
}

impl ReplicationPhase {
    /// Whether the stream may still emit events that change the phase.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            ReplicationPhase::Connecting
                | ReplicationPhase::Active
                | ReplicationPhase::Paused
                | ReplicationPhase::Errored
                | ReplicationPhase::Denied
        )
    }

    /// The phase after observing `event`.
    pub fn on_event(self, event: &ReplicationEvent) -> ReplicationPhase {
        use ReplicationPhase::*;
        match (self, event) {
            (Idle | Stopped, _) => self,
            (_, ReplicationEvent::Complete(_)) => Stopped,
            (Canceled, _) => Canceled,
            (_, ReplicationEvent::Active) => Active,
            (_, ReplicationEvent::Paused(_)) => Paused,
            (Connecting | Active | Paused, ReplicationEvent::Error(_)) => Errored,
            (Connecting | Active | Paused, ReplicationEvent::Denied(_)) => Denied,
            _ => self,
        }
    }

    /// The phase after cancellation is requested.
    pub fn on_cancel(self) -> ReplicationPhase {
        if self.is_running() {
            ReplicationPhase::Canceled
        } else {
            self
        }
    }
}

impl fmt::Display for ReplicationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicationPhase::Idle => write!(f, "Idle"),
            ReplicationPhase::Connecting => write!(f, "Connecting"),
            ReplicationPhase::Active => write!(f, "Active"),
            ReplicationPhase::Paused => write!(f, "Paused"),
            ReplicationPhase::Errored => write!(f, "Errored"),
            ReplicationPhase::Denied => write!(f, "Denied"),
            ReplicationPhase::Canceled => write!(f, "Canceled"),
            ReplicationPhase::Stopped => write!(f, "Stopped"),
        }
    }
}
