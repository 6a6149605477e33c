//! # Outbound Ports (Driven Ports)
//!
//! Collaborators the dispatcher drives:
//!
//! - [`EncryptionProtocol`]: sessions, ciphertext, bundle advertisement policy
//! - [`ReplicatedLog`]: group membership, append, periodic flush, extraction
//! - [`Transport`]: moves envelopes and tracks deliveries
//! - [`DispatchNotifier`]: tells subscribers what happened
//! - [`TimeSource`]: wall clock for the advertisement debounce

use async_trait::async_trait;
use shared_bus::DispatchEvent;
use shared_types::{FlushBatch, GroupId, Hash, MessageId, NetworkMessage, PublicKey, TransportHash};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

use crate::domain::{
    DecryptResult, EncryptionError, Identity, MessageSpec, ReplicationError, SharedSecret,
    TransportError,
};

/// End-to-end encryption and session management.
///
/// All operations are in-memory; none suspend.
pub trait EncryptionProtocol: Send + Sync {
    /// Encrypt for `recipient` over an existing session.
    ///
    /// Returns `EncryptionError::NoSession` when no device of the recipient
    /// is known.
    fn build_direct_message(
        &self,
        identity: &Identity,
        recipient: &PublicKey,
        plaintext: &[u8],
    ) -> Result<MessageSpec, EncryptionError>;

    /// Encrypt for `recipient` with a key derived from both identities only.
    fn build_dh_message(
        &self,
        identity: &Identity,
        recipient: &PublicKey,
        plaintext: &[u8],
    ) -> Result<MessageSpec, EncryptionError>;

    /// Whether this node should advertise its bundle to `peer` at `now`
    /// (seconds). The debounce policy lives here.
    fn should_advertise_bundle(&self, peer: &PublicKey, now: u64) -> Result<bool, EncryptionError>;

    /// Descriptor carrying this node's current bundle for `peer`.
    fn build_bundle_advertise_message(
        &self,
        identity: &Identity,
        peer: &PublicKey,
    ) -> Result<MessageSpec, EncryptionError>;

    /// Record an advertisement to `peer` at `now`. Idempotent.
    fn confirm_bundle_advertisement(&self, peer: &PublicKey, now: u64);

    /// Try to open `payload` sent by `sender`.
    fn decrypt(&self, identity: &Identity, sender: &PublicKey, payload: &[u8]) -> DecryptResult;
}

/// Replicated delivery log.
///
/// Flushes are not callbacks: after `init` the log sends each due batch as a
/// `FlushBatch` over the given channel.
pub trait ReplicatedLog: Send + Sync {
    fn is_peer_in_group(&self, group: &GroupId, peer: &PublicKey) -> Result<bool, ReplicationError>;

    fn add_peer(&self, group: GroupId, peer: PublicKey) -> Result<(), ReplicationError>;

    /// Append a wrapped message; returns the log's own id for it.
    fn append_message(&self, group: GroupId, wrapped: Vec<u8>) -> Result<Hash, ReplicationError>;

    /// Hand the log the channel its flushes go to.
    fn init(&self, outbox: mpsc::Sender<FlushBatch>);

    /// Start flushing every `tick`.
    fn start(&self, tick: Duration) -> Result<(), ReplicationError>;

    /// Stop flushing. Idempotent.
    fn stop(&self);

    /// Expand a received payload from `sender` into wrapped messages.
    ///
    /// Bytes that are not a log payload come back as a single message.
    fn extract_messages(
        &self,
        sender: &PublicKey,
        payload: &[u8],
    ) -> Result<Vec<Vec<u8>>, ReplicationError>;
}

/// Publish/subscribe transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send on the topic derived from `secret`.
    async fn send_private_with_shared_secret(
        &self,
        message: &NetworkMessage,
        recipient: &PublicKey,
        secret: &SharedSecret,
    ) -> Result<TransportHash, TransportError>;

    /// Send on the partitioned topic derived from `recipient`.
    async fn send_private_with_partitioned(
        &self,
        message: &NetworkMessage,
        recipient: &PublicKey,
    ) -> Result<TransportHash, TransportError>;

    /// Send on the public topic derived from `chat_name`.
    async fn send_public(
        &self,
        message: &NetworkMessage,
        chat_name: &str,
    ) -> Result<TransportHash, TransportError>;

    /// Record that `message_ids` left together as the envelope `hash`.
    fn track(&self, message_ids: &[MessageId], hash: TransportHash, message: &NetworkMessage);

    /// Install newly negotiated shared secrets (subscribe to their topics).
    async fn process_negotiated_secrets(
        &self,
        secrets: Vec<SharedSecret>,
    ) -> Result<(), TransportError>;
}

/// Where dispatch events go.
#[async_trait]
pub trait DispatchNotifier: Send + Sync {
    async fn notify(&self, event: DispatchEvent);
}

/// Notifier that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl DispatchNotifier for NoopNotifier {
    async fn notify(&self, _event: DispatchEvent) {}
}

/// Time source abstraction for testability.
pub trait TimeSource: Send + Sync {
    /// Current time, seconds since epoch.
    fn now(&self) -> u64;
}

/// Default time source using system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_source() {
        let now = SystemTimeSource.now();
        assert!(now > 1_600_000_000);
    }
}
