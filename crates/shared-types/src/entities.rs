//! # Core Domain Entities
//!
//! Value types that every crate of the dispatch workspace agrees on.
//!
//! ## Clusters
//!
//! - **Identity**: `PublicKey`, `GroupId`
//! - **Identification**: `MessageId`, `TransportHash`
//! - **Application**: `MessageType`

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use std::fmt;

use crate::errors::TypesError;

/// Length of a SEC1 compressed secp256k1 public key.
pub const PUBLIC_KEY_LENGTH: usize = 33;

/// A 32-byte Keccak-256 digest.
pub type Hash = [u8; 32];

/// Hash the transport assigns to an envelope it accepted.
pub type TransportHash = Hash;

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

/// A SEC1 compressed secp256k1 public key.
///
/// This is the only key representation that crosses crate boundaries. Curve
/// validation happens in `shared-crypto`; this type only guarantees length.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey(#[serde_as(as = "Bytes")] pub [u8; PUBLIC_KEY_LENGTH]);

impl PublicKey {
    /// Build from a byte slice of exactly 33 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypesError> {
        let array: [u8; PUBLIC_KEY_LENGTH] =
            bytes.try_into().map_err(|_| TypesError::InvalidLength {
                expected: PUBLIC_KEY_LENGTH,
                actual: bytes.len(),
            })?;
        Ok(Self(array))
    }

    /// Raw compressed bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }

    /// `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 bytes are plenty to tell peers apart in logs.
        write!(f, "PublicKey(0x{}..)", hex::encode(&self.0[..8]))
    }
}

/// Identifier of a delivery group in the replicated log.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub Hash);

impl GroupId {
    /// Raw bytes.
    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId(0x{}..)", hex::encode(&self.0[..8]))
    }
}

// =============================================================================
// CLUSTER B: IDENTIFICATION
// =============================================================================

/// Content-addressed identifier of a wrapped message.
///
/// Derived as `keccak256(sender_pubkey || wrapped_bytes)`; see
/// `md-02-message-dispatch::domain::wrapper::message_id`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub Hash);

impl MessageId {
    /// Raw bytes.
    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }

    /// `0x`-prefixed lowercase hex, the form applications store.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse a hex id, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|e| TypesError::InvalidHex(e.to_string()))?;
        let array: Hash = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypesError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self(array))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.to_hex())
    }
}

// =============================================================================
// CLUSTER C: APPLICATION
// =============================================================================

/// Application-level type tag stamped into every wrapped message.
///
/// Serialized as its numeric code. Codes this build does not know decode as
/// `Unknown` so newer peers never make a message undecodable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u32", from = "u32")]
pub enum MessageType {
    /// Unrecognised or unset.
    Unknown,
    /// One-to-one, group or public chat message.
    ChatMessage,
    /// Contact profile update.
    ContactUpdate,
    /// Group membership change set, optionally carrying a chat message.
    MembershipUpdateMessage,
    /// Device pairing bootstrap.
    PairInstallation,
    /// Multi-device installation sync.
    SyncInstallation,
    /// Multi-device contact sync.
    SyncInstallationContact,
    /// Multi-device public chat sync.
    SyncInstallationPublicChat,
    /// Periodic contact code (bundle) advertisement.
    ContactCodeAdvertisement,
    /// Push notification registration; encrypted end to end, passed through.
    PushNotificationRegistration,
    /// Emoji reaction to a message.
    EmojiReaction,
    /// Invitation to join a group chat.
    GroupChatInvitation,
    /// Display name / avatar identity.
    ChatIdentity,
}

impl MessageType {
    /// Numeric wire code.
    pub fn code(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::ChatMessage => 1,
            Self::ContactUpdate => 2,
            Self::MembershipUpdateMessage => 3,
            Self::PairInstallation => 4,
            Self::SyncInstallation => 5,
            Self::SyncInstallationContact => 12,
            Self::SyncInstallationPublicChat => 14,
            Self::ContactCodeAdvertisement => 15,
            Self::PushNotificationRegistration => 16,
            Self::EmojiReaction => 22,
            Self::GroupChatInvitation => 23,
            Self::ChatIdentity => 24,
        }
    }
}

impl From<u32> for MessageType {
    fn from(code: u32) -> Self {
        match code {
            1 => Self::ChatMessage,
            2 => Self::ContactUpdate,
            3 => Self::MembershipUpdateMessage,
            4 => Self::PairInstallation,
            5 => Self::SyncInstallation,
            12 => Self::SyncInstallationContact,
            14 => Self::SyncInstallationPublicChat,
            15 => Self::ContactCodeAdvertisement,
            16 => Self::PushNotificationRegistration,
            22 => Self::EmojiReaction,
            23 => Self::GroupChatInvitation,
            24 => Self::ChatIdentity,
            _ => Self::Unknown,
        }
    }
}

impl From<MessageType> for u32 {
    fn from(t: MessageType) -> Self {
        t.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_from_slice_rejects_wrong_length() {
        let err = PublicKey::from_slice(&[2u8; 32]).unwrap_err();
        assert!(matches!(
            err,
            TypesError::InvalidLength {
                expected: 33,
                actual: 32
            }
        ));
    }

    #[test]
    fn test_public_key_hex() {
        let key = PublicKey([0x02; 33]);
        assert!(key.to_hex().starts_with("0x0202"));
        assert_eq!(key.to_hex().len(), 2 + 66);
    }

    #[test]
    fn test_message_id_hex_roundtrip() {
        let id = MessageId([0xAB; 32]);
        assert_eq!(MessageId::from_hex(&id.to_hex()).unwrap(), id);
        assert_eq!(MessageId::from_hex(&hex::encode([0xAB; 32])).unwrap(), id);
    }

    #[test]
    fn test_message_id_from_hex_rejects_short_input() {
        assert!(MessageId::from_hex("0xabcd").is_err());
        assert!(MessageId::from_hex("0xzz").is_err());
    }

    #[test]
    fn test_message_type_codes_are_stable() {
        assert_eq!(MessageType::ChatMessage.code(), 1);
        assert_eq!(MessageType::PairInstallation.code(), 4);
        assert_eq!(MessageType::from(22), MessageType::EmojiReaction);
    }

    #[test]
    fn test_unknown_message_type_code() {
        assert_eq!(MessageType::from(9999), MessageType::Unknown);
    }

    #[test]
    fn test_message_type_serializes_as_code() {
        let bytes = bincode::serialize(&MessageType::ContactUpdate).unwrap();
        assert_eq!(bytes, 2u32.to_le_bytes());
    }
}
