//! # Replicated Log Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::DatasyncError;

/// Default flush interval.
pub const DEFAULT_TICK_MS: u64 = 300;

/// Default transport message size limit the batch budget derives from.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Replicated log configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasyncConfig {
    /// Interval between flushes, milliseconds.
    pub tick_ms: u64,

    /// Byte budget for the message bodies of one flush batch.
    pub max_batch_bytes: usize,

    /// Retransmission backoff base, in ticks. Attempt `n` waits
    /// `base * 2^(n-1)` ticks before the next one.
    pub retransmission_base_epochs: u64,

    /// Sends per (peer, message) before the log gives up.
    pub max_send_attempts: u32,
}

impl Default for DatasyncConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            max_batch_bytes: batch_budget(DEFAULT_MAX_MESSAGE_SIZE),
            retransmission_base_epochs: 2,
            max_send_attempts: 10,
        }
    }
}

impl DatasyncConfig {
    /// Create a config for testing (fast ticks, short backoff).
    pub fn for_testing() -> Self {
        Self {
            tick_ms: 10,
            max_batch_bytes: batch_budget(DEFAULT_MAX_MESSAGE_SIZE),
            retransmission_base_epochs: 1,
            max_send_attempts: 5,
        }
    }

    /// Derive the batch budget from the transport's size limit.
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_batch_bytes = batch_budget(max_message_size);
        self
    }

    /// Flush interval.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Reject values the flush loop cannot run with.
    pub fn validate(&self) -> Result<(), DatasyncError> {
        if self.tick_ms == 0 {
            return Err(DatasyncError::InvalidConfig("tick_ms cannot be 0".into()));
        }
        if self.max_batch_bytes == 0 {
            return Err(DatasyncError::InvalidConfig(
                "max_batch_bytes cannot be 0".into(),
            ));
        }
        if self.max_send_attempts == 0 {
            return Err(DatasyncError::InvalidConfig(
                "max_send_attempts cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

/// Three quarters of the transport limit; the rest is left for encryption
/// and envelope overhead.
pub fn batch_budget(max_message_size: usize) -> usize {
    max_message_size / 4 * 3
}
