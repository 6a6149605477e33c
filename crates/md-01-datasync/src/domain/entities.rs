//! # Log Entities
//!
//! Messages, payloads and per-peer delivery records.

use serde::{Deserialize, Serialize};
use shared_crypto::Keccak256Hasher;
use shared_types::{GroupId, Hash, PublicKey};

/// Identifier of a message inside the log. Distinct from the dispatcher's
/// `MessageId`: it also covers the group and append time.
pub type LogMessageId = Hash;

/// Fixed per-message overhead counted against the batch budget.
pub const MESSAGE_OVERHEAD_BYTES: usize = 48;

/// A message appended to a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    /// Group the message was appended to.
    pub group_id: GroupId,
    /// Append time, milliseconds since epoch.
    pub timestamp: u64,
    /// Opaque body (a wrapped application message).
    pub body: Vec<u8>,
}

impl LogMessage {
    /// `keccak256(group_id || timestamp_be || body)`.
    pub fn id(&self) -> LogMessageId {
        let mut hasher = Keccak256Hasher::new();
        hasher
            .update(self.group_id.as_bytes())
            .update(&self.timestamp.to_be_bytes())
            .update(&self.body);
        hasher.finalize()
    }

    /// Bytes this message counts against a batch.
    pub fn batch_cost(&self) -> usize {
        self.body.len() + MESSAGE_OVERHEAD_BYTES
    }
}

/// What travels between two logs in one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Ids of messages received from the peer since the last flush.
    pub acks: Vec<LogMessageId>,
    /// Messages owed to the peer.
    pub messages: Vec<LogMessage>,
}

impl Payload {
    /// Nothing to send.
    pub fn is_empty(&self) -> bool {
        self.acks.is_empty() && self.messages.is_empty()
    }
}

/// Delivery state of one message towards one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Message owed.
    pub message_id: LogMessageId,
    /// Sends so far.
    pub attempts: u32,
    /// First tick at which the message is due again.
    pub next_epoch: u64,
}

impl Delivery {
    /// A delivery due at the next flush.
    pub fn new(message_id: LogMessageId) -> Self {
        Self {
            message_id,
            attempts: 0,
            next_epoch: 0,
        }
    }
}

/// A flush result before encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerBatch {
    /// Peer the batch goes to.
    pub peer: PublicKey,
    /// Payload for the peer.
    pub payload: Payload,
}
