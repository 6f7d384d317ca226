//! Cancellable multi-event streams.
//!
//! A stream is split into two halves: the [`StreamHandle`] held by the
//! consumer (event receiver plus cancel switch) and the [`StreamEmitter`]
//! held by the producer task. Cancellation is cooperative: the producer
//! observes the switch, winds down and usually emits a final completion
//! event.

use tokio::sync::{mpsc, watch};

/// Cancels a stream. Clones control the same stream.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx: std::sync::Arc::new(tx) }, rx)
    }

    /// Requests cancellation. Calling this more than once is harmless.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether cancellation was requested.
    pub fn is_canceled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Consumer half of a stream.
#[derive(Debug)]
pub struct StreamHandle<E> {
    events: mpsc::UnboundedReceiver<E>,
    cancel: CancelHandle,
}

impl<E> StreamHandle<E> {
    /// Creates a connected handle/emitter pair.
    pub fn channel() -> (Self, StreamEmitter<E>) {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (cancel, canceled) = CancelHandle::new();
        (
            Self { events, cancel },
            StreamEmitter {
                events: events_tx,
                canceled,
            },
        )
    }

    /// Receives the next event. Returns `None` once the producer is gone.
    pub async fn recv(&mut self) -> Option<E> {
        self.events.recv().await
    }

    /// Receives an event if one is immediately available.
    pub fn try_recv(&mut self) -> Option<E> {
        self.events.try_recv().ok()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns a cancel switch that outlives the receiver.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Splits into the raw receiver and the cancel switch.
    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<E>, CancelHandle) {
        (self.events, self.cancel)
    }
}

/// Producer half of a stream.
#[derive(Debug)]
pub struct StreamEmitter<E> {
    events: mpsc::UnboundedSender<E>,
    canceled: watch::Receiver<bool>,
}

impl<E> StreamEmitter<E> {
    /// Emits an event. Returns `false` if the consumer dropped its receiver.
    pub fn emit(&self, event: E) -> bool {
        self.events.send(event).is_ok()
    }

    /// Whether the consumer requested cancellation or dropped every cancel
    /// switch.
    pub fn is_canceled(&self) -> bool {
        *self.canceled.borrow() || self.canceled.has_changed().is_err()
    }

    /// Whether the consumer dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }

    /// Resolves once cancellation is requested.
    pub async fn canceled(&mut self) {
        // A dropped cancel switch counts as cancellation.
        let _ = self.canceled.wait_for(|canceled| *canceled).await;
    }
}
