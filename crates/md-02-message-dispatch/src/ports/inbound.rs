//! # Inbound Ports (Driving Ports)
//!
//! The API the application calls.

use async_trait::async_trait;
use shared_types::{MessageId, PublicKey, TransportMessage};

use crate::domain::{DispatchError, RawMessage, SendContext, StatusMessage};

/// Message dispatch API.
///
/// Every send returns the identifier of the wrapped message or an error; a
/// failed send leaves nothing dispatched for the failing recipient.
#[async_trait]
pub trait MessageDispatchApi: Send + Sync {
    /// Send to one recipient through the configured delivery mode.
    async fn send_private(
        &self,
        ctx: &SendContext,
        recipient: &PublicKey,
        message: RawMessage,
    ) -> Result<MessageId, DispatchError>;

    /// Send one logical message to every recipient.
    ///
    /// All copies share one identifier. The first failing recipient aborts
    /// the call; copies already handed off stay handed off.
    async fn send_group(
        &self,
        ctx: &SendContext,
        recipients: &[PublicKey],
        message: RawMessage,
    ) -> Result<MessageId, DispatchError>;

    /// Publish unencrypted on the topic derived from `chat_name`.
    async fn send_public(
        &self,
        ctx: &SendContext,
        chat_name: &str,
        message: RawMessage,
    ) -> Result<MessageId, DispatchError>;

    /// Send a device pairing message. Always direct, never needs a session.
    async fn send_pair_installation(
        &self,
        ctx: &SendContext,
        recipient: &PublicKey,
        message: RawMessage,
    ) -> Result<MessageId, DispatchError>;

    /// Decode a received envelope into zero or more messages.
    ///
    /// Only an unusable envelope is an error. With `want_application`
    /// false the application stage is skipped.
    async fn process_incoming(
        &self,
        message: TransportMessage,
        want_application: bool,
    ) -> Result<Vec<StatusMessage>, DispatchError>;
}
