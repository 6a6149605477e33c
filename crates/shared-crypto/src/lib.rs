//! # Shared Crypto - Identity and Payload Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `symmetric` | XChaCha20-Poly1305 | Payload encryption |
//! | `hashing` | Keccak-256 | Message ids, group ids, signature digests |
//! | `ecdsa` | secp256k1 | Identity signing, key recovery, ECDH |
//!
//! ## Security Properties
//!
//! - **XChaCha20**: 192-bit nonce, constant-time, side-channel immune
//! - **secp256k1**: RFC 6979 deterministic, low-S normalization

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ecdsa;
pub mod errors;
pub mod hashing;
pub mod symmetric;

// Re-exports
pub use ecdsa::{
    recover_public_key, validate_public_key, RecoverableSignature, Secp256k1KeyPair,
    RECOVERABLE_SIGNATURE_LENGTH,
};
pub use errors::CryptoError;
pub use hashing::{keccak256, Hash, Keccak256Hasher};
pub use symmetric::{decrypt, encrypt, open, seal, Nonce, SecretKey};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
