//! Event notifier
//!
//! Fans program events out to subscribers. Each subscriber chooses the event
//! kinds it receives; closed subscribers are pruned on the next emission.

use parking_lot::Mutex;
use std::sync::Arc;
use stepwise_shared::{EventKind, ProgramEvent};
use tokio::sync::mpsc;

/// Publish/subscribe channel for program events
#[derive(Clone, Default)]
pub struct EventNotifier {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

struct Subscriber {
    kinds: Vec<EventKind>,
    tx: mpsc::UnboundedSender<ProgramEvent>,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive events of a single kind
    pub fn subscribe(&self, kind: EventKind) -> mpsc::UnboundedReceiver<ProgramEvent> {
        self.subscribe_to(&[kind])
    }

    /// Receive events of every kind
    pub fn subscribe_all(&self) -> mpsc::UnboundedReceiver<ProgramEvent> {
        self.subscribe_to(&EventKind::ALL)
    }

    /// Receive events of the given kinds
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> mpsc::UnboundedReceiver<ProgramEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(Subscriber {
            kinds: kinds.to_vec(),
            tx,
        });
        rx
    }

    /// Deliver an event to every subscriber of its kind
    pub fn emit(&self, event: ProgramEvent) {
        let kind = event.kind();
        self.subscribers.lock().retain(|sub| {
            if sub.kinds.contains(&kind) {
                sub.tx.send(event.clone()).is_ok()
            } else {
                !sub.tx.is_closed()
            }
        });
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sub| !sub.tx.is_closed());
        subscribers.len()
    }
}

impl std::fmt::Debug for EventNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventNotifier")
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}
