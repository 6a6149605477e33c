//! # Event Publisher
//!
//! The dispatcher publishes through [`EventPublisher`]; applications hold the
//! concrete [`InMemoryEventBus`] and subscribe on it.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::trace;

use crate::events::{DispatchEvent, EventFilter};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;

/// Publishing side of the bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish `event`. Returns how many subscriptions were handed it.
    async fn publish(&self, event: DispatchEvent) -> usize;

    /// Events published since creation, delivered or not.
    fn events_published(&self) -> u64;
}

/// Broadcast bus local to the process.
///
/// Events published while nobody is subscribed are counted and dropped.
pub struct InMemoryEventBus {
    sender: broadcast::Sender<DispatchEvent>,
    published: AtomicU64,
}

impl InMemoryEventBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self {
            sender,
            published: AtomicU64::new(0),
        }
    }

    /// Receive every event published from now on that `filter` accepts.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        Subscription::new(self.sender.subscribe(), filter)
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: DispatchEvent) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        let topic = event.topic();
        // `send` only fails when there are no receivers.
        let receivers = self.sender.send(event).unwrap_or(0);
        trace!(?topic, receivers, "Event published");
        receivers
    }

    fn events_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventTopic;
    use shared_types::entities::{MessageId, PublicKey};

    fn scheduled() -> DispatchEvent {
        DispatchEvent::MessageScheduled {
            recipient: PublicKey([2; 33]),
            message_id: MessageId([7; 32]),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_counted() {
        let bus = InMemoryEventBus::new();
        assert_eq!(bus.publish(scheduled()).await, 0);
        assert_eq!(bus.events_published(), 1);
    }

    #[tokio::test]
    async fn test_every_subscription_is_handed_the_event() {
        let bus = InMemoryEventBus::default();
        let _all = bus.subscribe(EventFilter::all());
        let _lifecycle = bus.subscribe(EventFilter::topics(vec![EventTopic::Lifecycle]));

        // Filtering happens on receive.
        assert_eq!(bus.publish(scheduled()).await, 2);
    }
}
