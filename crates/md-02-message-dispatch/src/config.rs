//! # Dispatch Configuration
//!
//! Everything the dispatcher reads is fixed at construction time; nothing is
//! looked up from ambient state during a send.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use md_01_datasync::DatasyncConfig;

use crate::domain::cost::{
    DEFAULT_POW_TARGET, DEFAULT_POW_TIME_SECONDS, LARGE_PAYLOAD_THRESHOLD, LARGE_POW_TARGET,
};
use crate::domain::entities::DeliveryMode;
use shared_types::DEFAULT_TTL_SECONDS;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("Failed to read {path}: {error}")]
    Io { path: String, error: String },

    /// File is not valid TOML for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A size or count that must be positive is zero.
    #[error("invalid limit: {0}")]
    InvalidLimit(String),

    /// A tick or timeout that must be positive is zero.
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
}

/// Outbound network message parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Envelope time to live, seconds.
    pub ttl_seconds: u32,
    /// Work target for payloads below the threshold.
    pub default_pow_target: f64,
    /// Work target for payloads at or above the threshold.
    pub large_pow_target: f64,
    /// Size at which the lower target applies, bytes (inclusive).
    pub large_payload_threshold: usize,
    /// Seconds the transport may spend on proof of work.
    pub pow_time_seconds: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
            default_pow_target: DEFAULT_POW_TARGET,
            large_pow_target: LARGE_POW_TARGET,
            large_payload_threshold: LARGE_PAYLOAD_THRESHOLD,
            pow_time_seconds: DEFAULT_POW_TIME_SECONDS,
        }
    }
}

/// Dispatcher configuration.
///
/// # Config File Format
///
/// ```toml
/// delivery_mode = "replicated_log"
/// datasync_tick_ms = 300
/// bundle_advertisement_timeout_ms = 1000
/// max_message_size = 1048576
///
/// [network]
/// ttl_seconds = 15
/// large_payload_threshold = 50000
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// How private messages are delivered.
    pub delivery_mode: DeliveryMode,

    /// Replicated log flush interval, milliseconds.
    pub datasync_tick_ms: u64,

    /// Retransmission backoff base, in log ticks.
    pub datasync_retransmission_base_epochs: u64,

    /// Sends per message before the log gives up.
    pub datasync_max_send_attempts: u32,

    /// Upper bound on a bundle advertisement send, milliseconds.
    pub bundle_advertisement_timeout_ms: u64,

    /// Outbound network message parameters.
    pub network: NetworkConfig,

    /// Transport message size limit, bytes.
    pub max_message_size: usize,

    /// Capacity of the channel between the log and the flush worker.
    pub worker_channel_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            delivery_mode: DeliveryMode::ReplicatedLog,
            datasync_tick_ms: 300,
            datasync_retransmission_base_epochs: 2,
            datasync_max_send_attempts: 10,
            bundle_advertisement_timeout_ms: 1000,
            network: NetworkConfig::default(),
            max_message_size: 1024 * 1024,
            worker_channel_capacity: 256,
        }
    }
}

impl DispatchConfig {
    /// Create a config for testing (fast ticks, short backoff).
    pub fn for_testing() -> Self {
        Self {
            datasync_tick_ms: 10,
            datasync_retransmission_base_epochs: 1,
            datasync_max_send_attempts: 20,
            bundle_advertisement_timeout_ms: 200,
            worker_channel_capacity: 16,
            ..Self::default()
        }
    }

    /// Same as [`Self::for_testing`] with direct delivery.
    pub fn direct_for_testing() -> Self {
        Self {
            delivery_mode: DeliveryMode::Direct,
            ..Self::for_testing()
        }
    }

    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string. Missing keys keep defaults.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the dispatcher cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_channel_capacity == 0 {
            return Err(ConfigError::InvalidLimit(
                "worker_channel_capacity cannot be 0".into(),
            ));
        }

        if self.max_message_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_message_size cannot be 0".into(),
            ));
        }

        if self.datasync_max_send_attempts == 0 {
            return Err(ConfigError::InvalidLimit(
                "datasync_max_send_attempts cannot be 0".into(),
            ));
        }

        if self.datasync_tick_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "datasync_tick_ms cannot be 0".into(),
            ));
        }

        if self.bundle_advertisement_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "bundle_advertisement_timeout_ms cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Replicated log flush interval.
    pub fn datasync_tick(&self) -> Duration {
        Duration::from_millis(self.datasync_tick_ms)
    }

    /// Bundle advertisement bound.
    pub fn bundle_advertisement_timeout(&self) -> Duration {
        Duration::from_millis(self.bundle_advertisement_timeout_ms)
    }

    /// Configuration for the replicated log this dispatcher drives.
    pub fn datasync_config(&self) -> DatasyncConfig {
        DatasyncConfig {
            tick_ms: self.datasync_tick_ms,
            retransmission_base_epochs: self.datasync_retransmission_base_epochs,
            max_send_attempts: self.datasync_max_send_attempts,
            ..DatasyncConfig::default()
        }
        .with_max_message_size(self.max_message_size)
    }
}
