//! # Dispatch Events
//!
//! Notifications the message dispatcher publishes for application
//! subscribers: what was sent, what was scheduled on the replicated log, and
//! lifecycle changes.

use serde::{Deserialize, Serialize};
use shared_types::entities::{MessageId, PublicKey, TransportHash};

/// All events that can be published to the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DispatchEvent {
    // =========================================================================
    // OUTBOUND
    // =========================================================================
    /// An encrypted envelope left through the transport.
    /// Emitted for direct sends, pairing sends and replicated-log flushes.
    MessageSent {
        /// Peer the envelope was encrypted for.
        recipient: PublicKey,
        /// Hash the transport assigned.
        transport_hash: TransportHash,
        /// Every message id carried by the envelope.
        message_ids: Vec<MessageId>,
    },

    /// A wrapped message was appended to the replicated log and will be
    /// delivered on a later flush.
    MessageScheduled {
        /// Peer the message is owed to.
        recipient: PublicKey,
        /// Id of the wrapped message.
        message_id: MessageId,
    },

    /// A wrapped message was published unencrypted on a public topic.
    PublicMessageSent {
        /// Public chat name the topic derives from.
        chat_name: String,
        /// Hash the transport assigned.
        transport_hash: TransportHash,
        /// Id of the wrapped message.
        message_id: MessageId,
    },

    // =========================================================================
    // SESSION RECOVERY
    // =========================================================================
    /// This node re-advertised its key bundle to a peer that lacked it.
    BundleAdvertised {
        /// Peer the bundle went to.
        recipient: PublicKey,
        /// Hash the transport assigned.
        transport_hash: TransportHash,
    },

    /// Decryption produced newly negotiated shared secrets.
    SharedSecretsNegotiated {
        /// Peers a secret was agreed with.
        peers: Vec<PublicKey>,
    },

    // =========================================================================
    // LIFECYCLE
    // =========================================================================
    /// The dispatcher stopped; no further events follow.
    DispatcherStopped,
}

impl DispatchEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::MessageSent { .. } => EventTopic::Sent,
            Self::MessageScheduled { .. } => EventTopic::Scheduled,
            Self::PublicMessageSent { .. } => EventTopic::Public,
            Self::BundleAdvertised { .. } | Self::SharedSecretsNegotiated { .. } => {
                EventTopic::Session
            }
            Self::DispatcherStopped => EventTopic::Lifecycle,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Encrypted sends.
    Sent,
    /// Replicated-log appends.
    Scheduled,
    /// Public topic sends.
    Public,
    /// Bundle advertisements and negotiated secrets.
    Session,
    /// Start/stop.
    Lifecycle,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &DispatchEvent) -> bool {
        self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent() -> DispatchEvent {
        DispatchEvent::MessageSent {
            recipient: PublicKey([2; 33]),
            transport_hash: [1; 32],
            message_ids: vec![MessageId([3; 32])],
        }
    }

    #[test]
    fn test_event_topic_mapping() {
        assert_eq!(sent().topic(), EventTopic::Sent);
        assert_eq!(DispatchEvent::DispatcherStopped.topic(), EventTopic::Lifecycle);
        assert_eq!(
            DispatchEvent::SharedSecretsNegotiated { peers: vec![] }.topic(),
            EventTopic::Session
        );
    }

    #[test]
    fn test_filter_all() {
        let filter = EventFilter::all();
        assert!(filter.matches(&sent()));
        assert!(filter.matches(&DispatchEvent::DispatcherStopped));
    }

    #[test]
    fn test_filter_by_topic() {
        let filter = EventFilter::topics(vec![EventTopic::Sent]);
        assert!(filter.matches(&sent()));

        let scheduled = DispatchEvent::MessageScheduled {
            recipient: PublicKey([2; 33]),
            message_id: MessageId([0; 32]),
        };
        assert!(!filter.matches(&scheduled));
    }

    #[test]
    fn test_explicit_all_topic() {
        let filter = EventFilter::topics(vec![EventTopic::All]);
        assert!(filter.matches(&DispatchEvent::DispatcherStopped));
    }
}
