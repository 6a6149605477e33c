//! # Dispatch Error Types
//!
//! Only the fatal-to-call class is represented as `Err`. Inbound stage
//! failures after transport decode are `StageOutcome::Dropped` values, never
//! errors.

use shared_crypto::CryptoError;
use shared_types::PublicKey;
use thiserror::Error;

/// Errors surfaced to send and receive callers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    /// The payload could not be wrapped.
    #[error("Wrap failed: {0}")]
    Wrap(#[from] WrapError),

    /// The encryption collaborator refused to build a message.
    #[error("Encryption failed: {0}")]
    Encryption(EncryptionError),

    /// No session with `peer`; a bundle advertisement may have been sent.
    #[error("No session with {peer}")]
    NoSession { peer: PublicKey },

    /// The transport rejected the send.
    #[error("Transport failed: {0}")]
    Transport(#[from] TransportError),

    /// The replicated log rejected a membership change or append.
    #[error("Replicated log failed: {0}")]
    Replication(#[from] ReplicationError),

    /// The caller's context was cancelled or its deadline passed.
    #[error("Send cancelled")]
    Cancelled,

    /// The received envelope is not usable.
    #[error("Transport decode failed: {0}")]
    TransportDecode(DecodeError),

    /// Arguments rejected before any work was done.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The dispatcher's configuration cannot be run with.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl From<EncryptionError> for DispatchError {
    fn from(err: EncryptionError) -> Self {
        match err {
            EncryptionError::NoSession { peer } => Self::NoSession { peer },
            other => Self::Encryption(other),
        }
    }
}

/// Errors from the encryption collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncryptionError {
    /// No known session or device for `peer`.
    #[error("No session for {peer}")]
    NoSession { peer: PublicKey },

    /// Building ciphertext failed.
    #[error("Encrypt error: {0}")]
    Encrypt(String),

    /// Ciphertext did not open.
    #[error("Decrypt error: {0}")]
    Decrypt(String),

    /// The payload carries no encryption frame (public messages).
    #[error("Payload is not encrypted")]
    NotEncrypted,

    /// Bundle lookup or advertisement bookkeeping failed.
    #[error("Bundle error: {0}")]
    Bundle(String),
}

/// Errors from the transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport refused or failed the send.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Payload is larger than the transport accepts.
    #[error("Message too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    /// Shared secrets could not be installed.
    #[error("Shared secret error: {0}")]
    SharedSecret(String),
}

/// Errors from the replicated log collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplicationError {
    /// Membership query or change failed.
    #[error("Membership error: {0}")]
    Membership(String),

    /// Append failed.
    #[error("Append error: {0}")]
    Append(String),

    /// Init/start/stop failed.
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// Inbound payload could not be expanded.
    #[error("Extract error: {0}")]
    Extract(String),
}

/// Errors wrapping an application payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WrapError {
    /// The identity could not sign.
    #[error("Signing failed: {0}")]
    Signing(#[from] CryptoError),

    /// Serialization failed.
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Errors decoding envelopes and application messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The transport envelope carries no usable sender key.
    #[error("Invalid sender key: {0}")]
    InvalidSender(String),

    /// The transport envelope is empty.
    #[error("Empty payload")]
    EmptyPayload,

    /// Bytes are not a metadata envelope.
    #[error("Malformed metadata: {0}")]
    Metadata(String),

    /// The signature does not recover to a key.
    #[error("Bad signature: {0}")]
    Signature(#[from] CryptoError),

    /// Bytes are not the application message their type claims.
    #[error("Malformed {message_type} message: {reason}")]
    Application {
        message_type: &'static str,
        reason: String,
    },
}
