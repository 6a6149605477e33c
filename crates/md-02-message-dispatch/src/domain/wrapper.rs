//! # Message Wrapper
//!
//! Stamps an application payload with its type tag and a recoverable
//! signature, and derives the content-addressed message identifier.
//!
//! ```text
//! wrapped = bincode(ApplicationMetadataMessage {
//!     signature: sign(keccak256(payload)),   // 65 bytes, r || s || v
//!     payload,
//!     message_type,
//! })
//! id = keccak256(compressed_sender_key || wrapped)
//! ```
//!
//! Signing is deterministic, so equal inputs give equal wrapped bytes and
//! equal identifiers on every node.

use serde::{Deserialize, Serialize};
use shared_crypto::{keccak256, recover_public_key, Keccak256Hasher, RecoverableSignature};
use shared_types::{MessageId, MessageType, PublicKey};

use crate::domain::entities::Identity;
use crate::domain::errors::{DecodeError, WrapError};

/// The metadata envelope every application payload travels in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationMetadataMessage {
    /// Signature over `keccak256(payload)`.
    pub signature: RecoverableSignature,
    /// Application payload.
    pub payload: Vec<u8>,
    /// Type tag.
    pub message_type: MessageType,
}

impl ApplicationMetadataMessage {
    /// Recover the author's key from the signature.
    pub fn recover_signer(&self) -> Result<PublicKey, DecodeError> {
        Ok(recover_public_key(&keccak256(&self.payload), &self.signature)?)
    }
}

/// Wrap `payload` as `message_type`, signed by `identity`.
pub fn wrap(
    payload: &[u8],
    message_type: MessageType,
    identity: &Identity,
) -> Result<Vec<u8>, WrapError> {
    let signature = identity.sign_recoverable(&keccak256(payload))?;
    let envelope = ApplicationMetadataMessage {
        signature,
        payload: payload.to_vec(),
        message_type,
    };
    bincode::serialize(&envelope).map_err(|e| WrapError::Encode(e.to_string()))
}

/// Parse a wrapped message without checking its signature.
pub fn unwrap(wrapped: &[u8]) -> Result<ApplicationMetadataMessage, DecodeError> {
    bincode::deserialize(wrapped).map_err(|e| DecodeError::Metadata(e.to_string()))
}

/// Identifier of `wrapped` as sent by `sender`.
pub fn message_id(sender: &PublicKey, wrapped: &[u8]) -> MessageId {
    let mut hasher = Keccak256Hasher::new();
    hasher.update(sender.as_bytes()).update(wrapped);
    MessageId(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_wrap_unwrap_recovers_author() {
        let identity = Identity::generate();
        let wrapped = wrap(b"hello", MessageType::ChatMessage, &identity).unwrap();

        let envelope = unwrap(&wrapped).unwrap();
        assert_eq!(envelope.payload, b"hello");
        assert_eq!(envelope.message_type, MessageType::ChatMessage);
        assert_eq!(envelope.recover_signer().unwrap(), identity.public_key());
    }

    #[test]
    fn test_wrap_is_deterministic() {
        let identity = Identity::from_bytes([7; 32]).unwrap();
        let a = wrap(b"same", MessageType::ContactUpdate, &identity).unwrap();
        let b = wrap(b"same", MessageType::ContactUpdate, &identity).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            message_id(&identity.public_key(), &a),
            message_id(&identity.public_key(), &b)
        );
    }

    #[test]
    fn test_id_depends_on_sender() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let wrapped = wrap(b"x", MessageType::ChatMessage, &alice).unwrap();
        assert_ne!(
            message_id(&alice.public_key(), &wrapped),
            message_id(&bob.public_key(), &wrapped)
        );
    }

    #[test]
    fn test_tampered_payload_recovers_other_key() {
        let identity = Identity::generate();
        let wrapped = wrap(b"original", MessageType::ChatMessage, &identity).unwrap();
        let mut envelope = unwrap(&wrapped).unwrap();
        envelope.payload = b"tampered".to_vec();

        match envelope.recover_signer() {
            Ok(key) => assert_ne!(key, identity.public_key()),
            Err(_) => {}
        }
    }

    #[test]
    fn test_garbage_is_not_metadata() {
        assert!(matches!(unwrap(b"garbage"), Err(DecodeError::Metadata(_))));
        assert!(matches!(unwrap(&[]), Err(DecodeError::Metadata(_))));
    }

    proptest! {
        #[test]
        fn prop_message_id_is_pure(key in any::<[u8; 32]>(), wrapped in proptest::collection::vec(any::<u8>(), 0..512)) {
            let mut bytes = [2u8; 33];
            bytes[1..].copy_from_slice(&key);
            let sender = PublicKey(bytes);
            prop_assert_eq!(message_id(&sender, &wrapped), message_id(&sender, &wrapped));
        }

        #[test]
        fn prop_equal_inputs_wrap_equal(payload in proptest::collection::vec(any::<u8>(), 0..256)) {
            let identity = Identity::from_bytes([9; 32]).unwrap();
            let a = wrap(&payload, MessageType::ChatMessage, &identity).unwrap();
            let b = wrap(&payload, MessageType::ChatMessage, &identity).unwrap();
            prop_assert_eq!(message_id(&identity.public_key(), &a), message_id(&identity.public_key(), &b));
        }
    }
}
