//! # Cost Estimator
//!
//! Anti-spam cost tier by payload size. Payloads at or above the threshold
//! get the *lower* work target so large media and sync batches stay
//! affordable.

use shared_types::NetworkMessage;

use crate::config::NetworkConfig;

/// Size at which the lower tier applies, bytes (inclusive).
pub const LARGE_PAYLOAD_THRESHOLD: usize = 50_000;

/// Work target for payloads below the threshold.
pub const DEFAULT_POW_TARGET: f64 = 0.002;

/// Work target for payloads at or above the threshold.
pub const LARGE_POW_TARGET: f64 = 0.000_002;

/// Seconds the transport may spend on proof of work.
pub const DEFAULT_POW_TIME_SECONDS: u32 = 5;

/// Anti-spam cost class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CostTier {
    /// Higher work target, payloads below the threshold.
    Standard,
    /// Lower work target, payloads at or above the threshold.
    Reduced,
}

impl CostTier {
    /// Work target of this tier under `network`.
    pub fn pow_target(self, network: &NetworkConfig) -> f64 {
        match self {
            Self::Standard => network.default_pow_target,
            Self::Reduced => network.large_pow_target,
        }
    }
}

/// Tier for a payload of `size` bytes against the default threshold.
pub fn estimate_cost(size: usize) -> CostTier {
    estimate_cost_with(size, LARGE_PAYLOAD_THRESHOLD)
}

/// Tier for a payload of `size` bytes against `threshold`.
pub fn estimate_cost_with(size: usize, threshold: usize) -> CostTier {
    if size >= threshold {
        CostTier::Reduced
    } else {
        CostTier::Standard
    }
}

/// Build the outbound envelope for `payload`, tiered on its own size.
pub fn network_message(payload: Vec<u8>, network: &NetworkConfig) -> NetworkMessage {
    let tier = estimate_cost_with(payload.len(), network.large_payload_threshold);
    NetworkMessage {
        ttl: network.ttl_seconds,
        pow_target: tier.pow_target(network),
        pow_time: network.pow_time_seconds,
        payload,
    }
}
