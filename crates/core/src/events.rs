//! In-process event publishing.
//!
//! Distinct from the file-backed broker: events never touch the disk and are
//! lost if nobody is subscribed.

use chrono::{DateTime, Utc};
use lk_protocol::ipc::Event;
use tokio::sync::broadcast;
use tracing::debug;

/// An event together with who emitted it and when.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub event: Event,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

/// Sink for core events.
pub trait EventPublisher: Send + Sync {
    fn emit(&self, event: Event, source: &str);
}

/// Broadcast-backed [`EventPublisher`].
///
/// Cloning shares the same channel. Slow subscribers lag and miss events
/// rather than blocking the publisher.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventPublisher for EventBus {
    fn emit(&self, event: Event, source: &str) {
        debug!(source, ?event, "emitting event");
        let envelope = EventEnvelope {
            event,
            source: source.to_string(),
            timestamp: Utc::now(),
        };
        // No subscribers is not an error.
        let _ = self.tx.send(envelope);
    }
}
