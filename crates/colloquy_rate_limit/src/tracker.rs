//! Event-sourced state owned by a single draining task.
//!
//! Producers never touch tracker state. They enqueue typed events on an
//! unbounded channel and a dedicated task applies them one at a time under the
//! tracker's lock. Readers take short-lived snapshots.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};
use tracing::{trace, warn};

/// State that evolves only by applying events.
pub trait TrackerState: Default + Send + 'static {
    /// Event type accepted by this state.
    type Event: Send + 'static;

    /// Fold one event into the state.
    fn apply(&mut self, event: Self::Event);
}

enum Message<E> {
    Event(E),
    Flush(oneshot::Sender<()>),
}

/// Handle to an event-sourced tracker.
///
/// Clones share the same queue and state. The draining task exits once every
/// handle has been dropped.
pub struct EventTracker<S: TrackerState> {
    sender: mpsc::UnboundedSender<Message<S::Event>>,
    state: Arc<Mutex<S>>,
}

impl<S: TrackerState> Clone for EventTracker<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<S: TrackerState + std::fmt::Debug> std::fmt::Debug for EventTracker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTracker")
            .field("state", &*lock(&self.state))
            .finish()
    }
}

impl<S: TrackerState> Default for EventTracker<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: TrackerState> EventTracker<S> {
    /// Start a tracker from the default state.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Self {
        Self::with_initial(S::default())
    }

    /// Start a tracker from an explicit initial state.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_initial(initial: S) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Message<S::Event>>();
        let state = Arc::new(Mutex::new(initial));
        let drain_state = Arc::clone(&state);

        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                match message {
                    Message::Event(event) => lock(&drain_state).apply(event),
                    Message::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            trace!("Tracker queue closed");
        });

        Self { sender, state }
    }

    /// Enqueue an event. Never blocks.
    pub fn record(&self, event: S::Event) {
        if self.sender.send(Message::Event(event)).is_err() {
            warn!("Tracker drain task has stopped; event dropped");
        }
    }

    /// Wait until every event recorded before this call has been applied.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(Message::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }

    /// Read the current state without cloning it.
    pub fn with_state<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&lock(&self.state))
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> S
    where
        S: Clone,
    {
        lock(&self.state).clone()
    }
}

// A panic inside `apply` leaves plain counters behind, which stay usable.
fn lock<S>(state: &Mutex<S>) -> MutexGuard<'_, S> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
