//! # Event bus for lifecycle notifications.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking publishing from every service task plus one-shot waits on a topic.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                  Consumers (many):
//!   service task a ──┐                 ┌──► Waiter (service b: wait init.a)
//!   service task b ──┼────► Bus ───────┼──► Waiter (service c: wait init.a)
//!   orchestrator   ──┘  (broadcast)    ├──► subscriber_listener ──► SubscriberSet
//!                                      └──► Bus::wait_for(topic) (user code)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **No persistence**: a receiver only observes events sent **after** it subscribed.
//!   A `wait_for` started after the event fired waits for the next occurrence.
//! - **Non-consuming waits**: every receiver gets its own clone of each event.
//! - **Lag handling**: slow receivers observe `RecvError::Lagged(n)` and skip `n` items.

use tokio::sync::broadcast::{self, error::RecvError};

use super::event::{Event, Topic};

/// Broadcast channel for lifecycle events.
///
/// ### Properties
/// - **Non-blocking**: `publish()` returns immediately.
/// - **Fire-and-forget**: no delivery or durability guarantees.
/// - **Cloneable**: cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active subscribers.
    ///
    /// If there are no receivers the event is dropped.
    pub fn publish(&self, ev: Event) {
        tracing::trace!(topic = %ev.topic, seq = ev.seq, "publish");
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Suspends until the next publish of `topic` and resolves with that event.
    ///
    /// Returns `None` if the bus is closed before the topic fires.
    pub async fn wait_for(&self, topic: &Topic) -> Option<Event> {
        self.subscribe().next_matching(topic).await
    }
}

/// Receiving half of the [`Bus`].
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<Event>,
}

/// Outcome of a single [`Subscription::recv`].
#[derive(Debug)]
pub enum Recv {
    /// Next event in order.
    Event(Event),
    /// The receiver fell behind and `n` events were skipped.
    Lagged(u64),
    /// Every sender is gone.
    Closed,
}

impl Subscription {
    /// Receives the next event, reporting lag explicitly.
    pub async fn recv(&mut self) -> Recv {
        match self.rx.recv().await {
            Ok(ev) => Recv::Event(ev),
            Err(RecvError::Lagged(n)) => Recv::Lagged(n),
            Err(RecvError::Closed) => Recv::Closed,
        }
    }

    /// Waits for the next event published on `topic`, skipping everything else.
    pub async fn next_matching(&mut self, topic: &Topic) -> Option<Event> {
        loop {
            match self.recv().await {
                Recv::Event(ev) if &ev.topic == topic => return Some(ev),
                Recv::Event(_) | Recv::Lagged(_) => continue,
                Recv::Closed => return None,
            }
        }
    }
}
