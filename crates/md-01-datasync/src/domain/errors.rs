//! Replicated log error types.

use shared_types::GroupId;
use thiserror::Error;

/// Replicated log errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatasyncError {
    /// Append to a group no peer was ever added to.
    #[error("Unknown group: {0:?}")]
    UnknownGroup(GroupId),

    /// `start` called before `init`.
    #[error("Log not initialised with an outbox")]
    NotInitialized,

    /// A tick, budget or attempt limit is zero.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// `start` called twice.
    #[error("Log flush loop already running")]
    AlreadyRunning,

    /// The flush consumer went away.
    #[error("Flush outbox closed")]
    OutboxClosed,

    /// Payload could not be encoded.
    #[error("Encode error: {0}")]
    Encode(String),

    /// Payload carried the log marker but did not decode.
    #[error("Decode error: {0}")]
    Decode(String),
}
