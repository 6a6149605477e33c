//! # Dispatch Entities
//!
//! ## Clusters
//!
//! - **Outbound**: `DeliveryMode`, `RawMessage`, `MessageSpec`, `SharedSecret`
//! - **Inbound**: `StatusMessage`
//! - **Recovery**: `RecoveryOutcome`

use serde::{Deserialize, Serialize};
use shared_crypto::{validate_public_key, Secp256k1KeyPair};
use shared_types::{MessageId, MessageType, PublicKey, Topic, TransportHash, TransportMessage};
use std::fmt;

use crate::domain::application::ApplicationMessage;
use crate::domain::errors::DecodeError;

/// The local participant's long-lived key pair.
pub type Identity = Secp256k1KeyPair;

// =============================================================================
// CLUSTER A: OUTBOUND
// =============================================================================

/// How private messages reach their recipient.
///
/// Fixed when the dispatcher is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Append to the replicated log; the log's flush does the sending.
    #[default]
    ReplicatedLog,
    /// Encrypt and send immediately.
    Direct,
}

impl DeliveryMode {
    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReplicatedLog => "replicated_log",
            Self::Direct => "direct",
        }
    }
}

/// Application payload and its type tag, as handed to a send operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub payload: Vec<u8>,
    pub message_type: MessageType,
}

impl RawMessage {
    pub fn new(payload: impl Into<Vec<u8>>, message_type: MessageType) -> Self {
        Self {
            payload: payload.into(),
            message_type,
        }
    }
}

/// A symmetric key agreed with a peer, usable for a dedicated topic.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret {
    /// Peer the secret is shared with.
    pub identity: PublicKey,
    /// Symmetric key.
    pub key: [u8; 32],
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSecret")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// Encrypted message descriptor for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSpec {
    /// Ciphertext.
    pub payload: Vec<u8>,
    /// Set when a shared secret with the recipient exists.
    pub shared_secret: Option<SharedSecret>,
}

impl MessageSpec {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            shared_secret: None,
        }
    }

    pub fn with_shared_secret(mut self, secret: SharedSecret) -> Self {
        self.shared_secret = Some(secret);
        self
    }
}

// =============================================================================
// CLUSTER B: INBOUND
// =============================================================================

/// One received message as it moves through the inbound stages.
///
/// Stage 1 builds the shell from the transport envelope. Decryption replaces
/// `payload`; extraction clones the shell once per logical message; metadata
/// decode fills `signer`, `id`, `message_type` and `application_payload`;
/// application decode fills `parsed`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    /// Hash of the envelope this message arrived in.
    pub transport_hash: TransportHash,
    /// Key the transport attributes the envelope to.
    pub transport_sender: PublicKey,
    /// Destination key, when the envelope was addressed to one.
    pub dst: Option<PublicKey>,
    /// Envelope timestamp, seconds.
    pub timestamp: u32,
    /// Envelope topic.
    pub topic: Topic,
    /// Envelope bytes before decryption.
    pub transport_payload: Vec<u8>,
    /// Current bytes: plaintext after decryption, a wrapped message after
    /// extraction.
    pub payload: Vec<u8>,
    /// Whether decryption succeeded.
    pub decrypted: bool,
    /// Author recovered from the wrapped message's signature.
    pub signer: Option<PublicKey>,
    /// Identifier recomputed from `signer` and the wrapped bytes.
    pub id: Option<MessageId>,
    /// Type tag from the metadata envelope.
    pub message_type: MessageType,
    /// Application payload from the metadata envelope.
    pub application_payload: Vec<u8>,
    /// Typed application message, when requested and decodable.
    pub parsed: Option<ApplicationMessage>,
}

impl StatusMessage {
    /// Build the shell from a transport envelope.
    ///
    /// Fails when the envelope has no payload or its sender key is not a
    /// compressed secp256k1 point.
    pub fn from_transport(message: TransportMessage) -> Result<Self, DecodeError> {
        if message.payload.is_empty() {
            return Err(DecodeError::EmptyPayload);
        }
        let transport_sender = PublicKey::from_slice(&message.sig)
            .map_err(|e| DecodeError::InvalidSender(e.to_string()))?;
        validate_public_key(&transport_sender)
            .map_err(|e| DecodeError::InvalidSender(e.to_string()))?;
        let dst = message
            .dst
            .as_deref()
            .and_then(|d| PublicKey::from_slice(d).ok());

        Ok(Self {
            transport_hash: message.hash,
            transport_sender,
            dst,
            timestamp: message.timestamp,
            topic: message.topic,
            payload: message.payload.clone(),
            transport_payload: message.payload,
            decrypted: false,
            signer: None,
            id: None,
            message_type: MessageType::Unknown,
            application_payload: Vec::new(),
            parsed: None,
        })
    }

    /// Copy of this shell carrying `payload`, for one extracted message.
    pub fn with_payload(&self, payload: Vec<u8>) -> Self {
        Self {
            payload,
            signer: None,
            id: None,
            message_type: MessageType::Unknown,
            application_payload: Vec::new(),
            parsed: None,
            ..self.clone()
        }
    }

    /// Whether `key` authored this message. Falls back to the transport
    /// sender before metadata decode.
    pub fn is_from(&self, key: &PublicKey) -> bool {
        is_own_message(self.signer.as_ref().unwrap_or(&self.transport_sender), key)
    }
}

/// Whether two keys name the same participant.
pub fn is_own_message(author: &PublicKey, own: &PublicKey) -> bool {
    author == own
}

// =============================================================================
// CLUSTER C: RECOVERY
// =============================================================================

/// What a bundle advertisement attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The encryption collaborator said no advertisement is due.
    NotDue,
    /// Sent and confirmed.
    Advertised(TransportHash),
    /// A step failed; swallowed.
    Failed(String),
    /// The send did not finish within the bound.
    TimedOut,
}

impl RecoveryOutcome {
    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotDue => "not_due",
            Self::Advertised(_) => "sent",
            Self::Failed(_) => "failed",
            Self::TimedOut => "timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> PublicKey {
        Secp256k1KeyPair::generate().public_key()
    }

    #[test]
    fn test_delivery_mode_default_is_replicated_log() {
        assert_eq!(DeliveryMode::default(), DeliveryMode::ReplicatedLog);
    }

    #[test]
    fn test_shell_from_transport() {
        let sender = key();
        let message = TransportMessage::new(sender.as_bytes().to_vec(), vec![1, 2, 3], [9; 32]);
        let shell = StatusMessage::from_transport(message).unwrap();
        assert_eq!(shell.transport_sender, sender);
        assert_eq!(shell.payload, vec![1, 2, 3]);
        assert_eq!(shell.transport_hash, [9; 32]);
        assert!(!shell.decrypted);
    }

    #[test]
    fn test_shell_rejects_bad_sender() {
        let short = TransportMessage::new(vec![2; 10], vec![1], [0; 32]);
        assert!(matches!(
            StatusMessage::from_transport(short),
            Err(DecodeError::InvalidSender(_))
        ));

        let off_curve = TransportMessage::new(vec![5; 33], vec![1], [0; 32]);
        assert!(matches!(
            StatusMessage::from_transport(off_curve),
            Err(DecodeError::InvalidSender(_))
        ));
    }

    #[test]
    fn test_shell_rejects_empty_payload() {
        let message = TransportMessage::new(key().as_bytes().to_vec(), vec![], [0; 32]);
        assert_eq!(
            StatusMessage::from_transport(message),
            Err(DecodeError::EmptyPayload)
        );
    }

    #[test]
    fn test_is_from_prefers_signer() {
        let transport = key();
        let author = key();
        let message = TransportMessage::new(transport.as_bytes().to_vec(), vec![1], [0; 32]);
        let mut shell = StatusMessage::from_transport(message).unwrap();
        assert!(shell.is_from(&transport));

        shell.signer = Some(author);
        assert!(shell.is_from(&author));
        assert!(!shell.is_from(&transport));
    }

    #[test]
    fn test_shared_secret_debug_hides_key() {
        let secret = SharedSecret {
            identity: PublicKey([2; 33]),
            key: [0xAA; 32],
        };
        assert!(!format!("{secret:?}").contains("170"));
    }
}
