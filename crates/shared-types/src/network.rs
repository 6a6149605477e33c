//! # Network Envelopes
//!
//! The two shapes a message takes at the transport boundary.
//!
//! - `NetworkMessage`: what the dispatcher hands to the transport after
//!   encryption (outbound).
//! - `TransportMessage`: what the transport hands back to the dispatcher
//!   (inbound), before any decryption.

use serde::{Deserialize, Serialize};

use crate::entities::TransportHash;

/// Transport-level time to live, in seconds.
pub const DEFAULT_TTL_SECONDS: u32 = 15;

/// Four byte topic the transport filters on.
pub type Topic = [u8; 4];

/// A transport-ready outbound envelope.
///
/// `pow_target` and `pow_time` are forwarded untouched; the dispatcher picks
/// them per payload size and never computes proof of work itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMessage {
    /// Lifetime on the network, seconds.
    pub ttl: u32,
    /// Encrypted (or, for public chats, plain wrapped) bytes.
    pub payload: Vec<u8>,
    /// Anti-spam work target.
    pub pow_target: f64,
    /// Seconds the transport may spend satisfying `pow_target`.
    pub pow_time: u32,
}

/// A raw envelope as received from the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportMessage {
    /// Public key the transport layer attributes the envelope to. Possibly
    /// ephemeral; the application-level author is recovered later.
    pub sig: Vec<u8>,
    /// Destination key, when the envelope was addressed to a key.
    pub dst: Option<Vec<u8>>,
    /// Envelope payload, encrypted or plain.
    pub payload: Vec<u8>,
    /// Transport hash of the envelope.
    pub hash: TransportHash,
    /// Sender timestamp, seconds since epoch.
    pub timestamp: u32,
    /// Remaining time to live, seconds.
    pub ttl: u32,
    /// Topic the envelope arrived on.
    pub topic: Topic,
}

impl TransportMessage {
    /// Minimal envelope around `payload`, used by adapters that only carry
    /// bytes and the claimed sender.
    pub fn new(sig: Vec<u8>, payload: Vec<u8>, hash: TransportHash) -> Self {
        Self {
            sig,
            dst: None,
            payload,
            hash,
            timestamp: 0,
            ttl: DEFAULT_TTL_SECONDS,
            topic: [0; 4],
        }
    }
}

/// One batch the replicated log wants delivered to a single peer.
///
/// Emitted by the log's flush loop and consumed by the dispatcher's flush
/// worker, which encrypts `payload` for `recipient` and sends it directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushBatch {
    /// Peer the batch is owed to.
    pub recipient: crate::entities::PublicKey,
    /// Encoded log payload (messages and acks).
    pub payload: Vec<u8>,
    /// Wrapped message bodies carried in `payload`, in order. Used to derive
    /// the message ids reported to delivery tracking.
    pub bodies: Vec<Vec<u8>>,
}
