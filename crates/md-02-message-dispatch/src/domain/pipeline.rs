//! # Inbound Pipeline Types
//!
//! ```text
//! TransportMessage
//!   │ 1. transport decode ── Err ──→ DispatchError::TransportDecode (fatal)
//!   ▼
//! StatusMessage shell
//!   │ 2. decrypt ── NoSession ──→ bundle advertisement, continue
//!   │            └─ Failed ─────→ log, continue with envelope bytes
//!   ▼
//!   │ 3. extraction ── Dropped ──→ zero messages
//!   ▼
//! [StatusMessage; n]
//!   │ 4. metadata ── Dropped ──→ that message only
//!   │ 5. application (optional) ── Dropped ──→ that message only
//!   ▼
//! delivered messages
//! ```

use shared_types::TransportHash;
use std::fmt;

use crate::domain::entities::{RecoveryOutcome, SharedSecret, StatusMessage};
use crate::domain::errors::EncryptionError;

/// Inbound stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    TransportDecode,
    Decryption,
    Extraction,
    Metadata,
    Application,
}

impl Stage {
    /// Log and metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransportDecode => "transport_decode",
            Self::Decryption => "decryption",
            Self::Extraction => "extraction",
            Self::Metadata => "metadata",
            Self::Application => "application",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a message left the pipeline early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropReason {
    pub stage: Stage,
    /// Envelope the message arrived in.
    pub hash: TransportHash,
    pub reason: String,
}

/// Result of a stage that may drop its input without failing the batch.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Delivered(T),
    Dropped(DropReason),
}

impl<T> StageOutcome<T> {
    /// Drop with `reason` at `stage`.
    pub fn dropped(stage: Stage, hash: TransportHash, reason: impl ToString) -> Self {
        Self::Dropped(DropReason {
            stage,
            hash,
            reason: reason.to_string(),
        })
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }

    /// Continue with the next stage if this one delivered.
    pub fn and_then<U>(self, next: impl FnOnce(T) -> StageOutcome<U>) -> StageOutcome<U> {
        match self {
            Self::Delivered(value) => next(value),
            Self::Dropped(reason) => StageOutcome::Dropped(reason),
        }
    }
}

/// What the encryption collaborator made of an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptResult {
    /// Opened. `negotiated` lists secrets agreed while doing so.
    Decrypted {
        plaintext: Vec<u8>,
        negotiated: Vec<SharedSecret>,
    },
    /// No session with the sender; recovery should run.
    NoSession,
    /// Not decryptable for any other reason.
    Failed(EncryptionError),
}

impl DecryptResult {
    pub fn decrypted(plaintext: Vec<u8>) -> Self {
        Self::Decrypted {
            plaintext,
            negotiated: Vec::new(),
        }
    }
}

/// Full account of one inbound call.
#[derive(Debug, Clone, Default)]
pub struct InboundReport {
    /// Messages that made it through every requested stage.
    pub messages: Vec<StatusMessage>,
    /// Messages dropped along the way.
    pub dropped: Vec<DropReason>,
    /// Set when decryption reported no session.
    pub recovery: Option<RecoveryOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_then_short_circuits() {
        let dropped: StageOutcome<u32> = StageOutcome::dropped(Stage::Metadata, [0; 32], "bad");
        let next = dropped.and_then(|v| StageOutcome::Delivered(v + 1));
        assert_eq!(
            next,
            StageOutcome::Dropped(DropReason {
                stage: Stage::Metadata,
                hash: [0; 32],
                reason: "bad".into()
            })
        );

        let delivered = StageOutcome::Delivered(1).and_then(|v| StageOutcome::Delivered(v + 1));
        assert_eq!(delivered, StageOutcome::Delivered(2));
        assert!(delivered.is_delivered());
    }

    #[test]
    fn test_stage_labels() {
        assert_eq!(Stage::TransportDecode.to_string(), "transport_decode");
        assert_eq!(Stage::Application.as_str(), "application");
    }
}
