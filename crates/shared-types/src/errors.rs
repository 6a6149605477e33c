//! # Error Types
//!
//! Errors raised while constructing shared value types from untrusted bytes.

use thiserror::Error;

/// Errors from parsing identifiers and keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    /// Byte input had the wrong length.
    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Hex input could not be decoded.
    #[error("Invalid hex: {0}")]
    InvalidHex(String),
}
