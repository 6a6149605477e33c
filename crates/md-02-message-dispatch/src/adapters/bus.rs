//! # Event Bus Adapter
//!
//! Publishes dispatch events on the shared bus.

use async_trait::async_trait;
use shared_bus::{DispatchEvent, EventPublisher};
use std::sync::Arc;
use tracing::trace;

use crate::ports::outbound::DispatchNotifier;

/// Notifier backed by an [`EventPublisher`].
pub struct BusNotifier<P: EventPublisher> {
    publisher: Arc<P>,
}

impl<P: EventPublisher> BusNotifier<P> {
    pub fn new(publisher: Arc<P>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl<P: EventPublisher + 'static> DispatchNotifier for BusNotifier<P> {
    async fn notify(&self, event: DispatchEvent) {
        let topic = event.topic();
        let receivers = self.publisher.publish(event).await;
        trace!(?topic, receivers, "Dispatch event published");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::{EventFilter, InMemoryEventBus};

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let bus = Arc::new(InMemoryEventBus::new());
        let mut subscription = bus.subscribe(EventFilter::all());
        let notifier = BusNotifier::new(Arc::clone(&bus));

        notifier.notify(DispatchEvent::DispatcherStopped).await;

        assert_eq!(
            subscription.recv().await,
            Some(DispatchEvent::DispatcherStopped)
        );
        assert_eq!(bus.events_published(), 1);
    }
}
