//! # Application Messages
//!
//! Typed bodies for the message types this core knows a schema for. Types
//! without a schema, and codes this build does not recognise, pass through
//! as `ApplicationMessage::Raw`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared_crypto::{keccak256, recover_public_key, RecoverableSignature};
use shared_types::{MessageType, PublicKey};

use crate::domain::entities::Identity;
use crate::domain::errors::{DecodeError, WrapError};

// =============================================================================
// CHAT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub clock: u64,
    pub timestamp: u64,
    pub chat_id: String,
    pub text: String,
    pub response_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmojiReaction {
    pub clock: u64,
    pub chat_id: String,
    /// Hex id of the message reacted to.
    pub message_id: String,
    pub emoji: u32,
    pub retracted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupChatInvitation {
    pub clock: u64,
    pub chat_id: String,
    pub introduction_message: String,
    pub state: u32,
}

// =============================================================================
// CONTACTS AND IDENTITY
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactUpdate {
    pub clock: u64,
    pub ens_name: String,
    pub profile_image: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatIdentity {
    pub clock: u64,
    pub ens_name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactCodeAdvertisement {
    pub chat_identity: Option<ChatIdentity>,
}

// =============================================================================
// INSTALLATIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairInstallation {
    pub clock: u64,
    pub installation_id: String,
    pub device_type: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncInstallationContact {
    pub clock: u64,
    pub id: String,
    pub ens_name: String,
    pub last_updated: u64,
    pub system_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncInstallationPublicChat {
    pub clock: u64,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncInstallation {
    pub contacts: Vec<SyncInstallationContact>,
    pub public_chats: Vec<SyncInstallationPublicChat>,
}

// =============================================================================
// GROUP MEMBERSHIP
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipEventType {
    ChatCreated,
    NameChanged,
    MembersAdded,
    MemberJoined,
    MemberRemoved,
    AdminsAdded,
    AdminRemoved,
}

/// One change to a group chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipUpdateEvent {
    pub clock: u64,
    pub event_type: MembershipEventType,
    /// Hex public keys affected by the change.
    pub members: Vec<String>,
    /// New name for `ChatCreated` and `NameChanged`.
    pub name: String,
}

/// A membership event signed by its author over `keccak256(chat_id || event)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMembershipEvent {
    pub signature: RecoverableSignature,
    /// Bincode-encoded `MembershipUpdateEvent`.
    pub event: Vec<u8>,
}

impl SignedMembershipEvent {
    fn sign(
        identity: &Identity,
        chat_id: &str,
        event: &MembershipUpdateEvent,
    ) -> Result<Self, WrapError> {
        let event = bincode::serialize(event).map_err(|e| WrapError::Encode(e.to_string()))?;
        let signature = identity.sign_recoverable(&event_digest(chat_id, &event))?;
        Ok(Self { signature, event })
    }

    /// Author of the event.
    pub fn signer(&self, chat_id: &str) -> Result<PublicKey, DecodeError> {
        Ok(recover_public_key(
            &event_digest(chat_id, &self.event),
            &self.signature,
        )?)
    }

    /// The event itself.
    pub fn decode_event(&self) -> Result<MembershipUpdateEvent, DecodeError> {
        bincode::deserialize(&self.event).map_err(|e| DecodeError::Application {
            message_type: "membership event",
            reason: e.to_string(),
        })
    }
}

fn event_digest(chat_id: &str, event: &[u8]) -> [u8; 32] {
    let mut data = Vec::with_capacity(chat_id.len() + event.len());
    data.extend_from_slice(chat_id.as_bytes());
    data.extend_from_slice(event);
    keccak256(&data)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipUpdateMessage {
    pub chat_id: String,
    pub events: Vec<SignedMembershipEvent>,
    /// Chat message sent along with the change, if any.
    pub message: Option<ChatMessage>,
}

impl MembershipUpdateMessage {
    /// Check every event signature recovers and every event decodes.
    ///
    /// Returns the decoded events with their authors.
    pub fn verify(&self) -> Result<Vec<(PublicKey, MembershipUpdateEvent)>, DecodeError> {
        self.events
            .iter()
            .map(|signed| -> Result<_, DecodeError> {
                Ok((signed.signer(&self.chat_id)?, signed.decode_event()?))
            })
            .collect()
    }
}

/// Encode a membership update, signing every event with `identity`.
pub fn encode_membership_update(
    identity: &Identity,
    chat_id: &str,
    events: &[MembershipUpdateEvent],
    message: Option<ChatMessage>,
) -> Result<Vec<u8>, WrapError> {
    let events = events
        .iter()
        .map(|event| SignedMembershipEvent::sign(identity, chat_id, event))
        .collect::<Result<Vec<_>, _>>()?;
    encode(&MembershipUpdateMessage {
        chat_id: chat_id.to_string(),
        events,
        message,
    })
}

// =============================================================================
// DECODE
// =============================================================================

/// A decoded application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationMessage {
    Chat(ChatMessage),
    ContactUpdate(ContactUpdate),
    MembershipUpdate(MembershipUpdateMessage),
    PairInstallation(PairInstallation),
    SyncInstallation(SyncInstallation),
    SyncInstallationContact(SyncInstallationContact),
    SyncInstallationPublicChat(SyncInstallationPublicChat),
    ContactCodeAdvertisement(ContactCodeAdvertisement),
    EmojiReaction(EmojiReaction),
    GroupChatInvitation(GroupChatInvitation),
    ChatIdentity(ChatIdentity),
    /// No schema for this type; bytes untouched.
    Raw {
        message_type: MessageType,
        payload: Vec<u8>,
    },
}

/// Serialize an application body.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, WrapError> {
    bincode::serialize(message).map_err(|e| WrapError::Encode(e.to_string()))
}

fn parse<T: DeserializeOwned>(name: &'static str, payload: &[u8]) -> Result<T, DecodeError> {
    bincode::deserialize(payload).map_err(|e| DecodeError::Application {
        message_type: name,
        reason: e.to_string(),
    })
}

/// Decode `payload` according to `message_type`.
pub fn decode(message_type: MessageType, payload: &[u8]) -> Result<ApplicationMessage, DecodeError> {
    use ApplicationMessage as A;

    let message = match message_type {
        MessageType::ChatMessage => A::Chat(parse("chat", payload)?),
        MessageType::ContactUpdate => A::ContactUpdate(parse("contact update", payload)?),
        MessageType::MembershipUpdateMessage => {
            let update: MembershipUpdateMessage = parse("membership update", payload)?;
            update.verify()?;
            A::MembershipUpdate(update)
        }
        MessageType::PairInstallation => A::PairInstallation(parse("pair installation", payload)?),
        MessageType::SyncInstallation => A::SyncInstallation(parse("sync installation", payload)?),
        MessageType::SyncInstallationContact => {
            A::SyncInstallationContact(parse("sync installation contact", payload)?)
        }
        MessageType::SyncInstallationPublicChat => {
            A::SyncInstallationPublicChat(parse("sync installation public chat", payload)?)
        }
        MessageType::ContactCodeAdvertisement => {
            A::ContactCodeAdvertisement(parse("contact code advertisement", payload)?)
        }
        MessageType::EmojiReaction => A::EmojiReaction(parse("emoji reaction", payload)?),
        MessageType::GroupChatInvitation => {
            A::GroupChatInvitation(parse("group chat invitation", payload)?)
        }
        MessageType::ChatIdentity => A::ChatIdentity(parse("chat identity", payload)?),
        // Encrypted end to end by the application; nothing to parse here.
        MessageType::PushNotificationRegistration | MessageType::Unknown => A::Raw {
            message_type,
            payload: payload.to_vec(),
        },
    };
    Ok(message)
}
