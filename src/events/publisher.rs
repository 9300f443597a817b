use tokio::sync::broadcast;
use tracing::debug;

use super::types::ConnectionEvent;

/// Fan-out publisher for connection events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// A connection event stamped with its publication time
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub event: ConnectionEvent,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl EventPublisher {
    /// `capacity` bounds how far a slow subscriber may lag before it sees `Lagged`
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to every current subscriber.
    ///
    /// Publishing with no subscribers is not an error; banners may not be mounted yet.
    pub fn publish(&self, event: ConnectionEvent) {
        debug!(event = event.name(), "📣 Publishing connection event");

        let published = PublishedEvent {
            event,
            published_at: chrono::Utc::now(),
        };

        if self.sender.send(published).is_err() {
            debug!("No event subscribers - event dropped");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}
