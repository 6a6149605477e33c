//! # ECDSA Identity (secp256k1)
//!
//! Long-lived identity keys: recoverable signatures and ECDH key agreement.
//!
//! ## Security Properties
//!
//! - RFC 6979 deterministic nonces (no RNG dependency for signing)
//! - Low-S normalization; the recovery id is adjusted accordingly
//! - Public keys leave this module only in 33-byte compressed form
//!
//! ## Use Cases
//!
//! - Signing wrapped application messages so receivers can recover the author
//! - Deriving pairwise symmetric keys between identities

use crate::hashing::{keccak256, Hash};
use crate::CryptoError;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use shared_types::PublicKey;
use zeroize::Zeroize;

/// Length of a recoverable signature: `r || s || v`.
pub const RECOVERABLE_SIGNATURE_LENGTH: usize = 65;

/// Recoverable ECDSA signature (65 bytes, `r || s || v`).
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverableSignature(#[serde_as(as = "Bytes")] [u8; RECOVERABLE_SIGNATURE_LENGTH]);

impl RecoverableSignature {
    /// Create from bytes (65 bytes).
    pub fn from_bytes(bytes: [u8; RECOVERABLE_SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; RECOVERABLE_SIGNATURE_LENGTH] {
        &self.0
    }

    /// Recovery id byte.
    pub fn v(&self) -> u8 {
        self.0[64]
    }
}

/// secp256k1 identity keypair.
pub struct Secp256k1KeyPair {
    signing_key: SigningKey,
}

impl Secp256k1KeyPair {
    /// Generate random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        Self { signing_key }
    }

    /// Create from secret key bytes (32 bytes).
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_bytes((&bytes).into()).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Get public key (compressed, 33 bytes).
    pub fn public_key(&self) -> PublicKey {
        compress(self.signing_key.verifying_key())
    }

    /// Sign a 32-byte digest; the signer's key can be recovered from the result.
    pub fn sign_recoverable(&self, digest: &Hash) -> Result<RecoverableSignature, CryptoError> {
        let (sig, recovery_id): (Signature, RecoveryId) = self
            .signing_key
            .sign_prehash_recoverable(digest)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

        let mut bytes = [0u8; RECOVERABLE_SIGNATURE_LENGTH];
        bytes[..64].copy_from_slice(&sig.to_bytes());
        bytes[64] = recovery_id.to_byte();
        Ok(RecoverableSignature(bytes))
    }

    /// Keccak-256 of the ECDH shared x-coordinate with `peer`.
    ///
    /// Symmetric: `a.shared_key(b.pub) == b.shared_key(a.pub)`.
    pub fn shared_key(&self, peer: &PublicKey) -> Result<[u8; 32], CryptoError> {
        let peer_key = parse_public_key(peer)?;
        let shared = k256::ecdh::diffie_hellman(
            self.signing_key.as_nonzero_scalar(),
            peer_key.as_affine(),
        );
        Ok(keccak256(shared.raw_secret_bytes().as_slice()))
    }

    /// Get secret key bytes (for serialization).
    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes().into()
    }
}

impl Clone for Secp256k1KeyPair {
    fn clone(&self) -> Self {
        Self {
            signing_key: self.signing_key.clone(),
        }
    }
}

impl std::fmt::Debug for Secp256k1KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secp256k1KeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

impl Drop for Secp256k1KeyPair {
    fn drop(&mut self) {
        // Zeroize secret key material
        let mut bytes: [u8; 32] = self.signing_key.to_bytes().into();
        bytes.zeroize();
    }
}

/// Recover the compressed public key that produced `signature` over `digest`.
pub fn recover_public_key(
    digest: &Hash,
    signature: &RecoverableSignature,
) -> Result<PublicKey, CryptoError> {
    let bytes = signature.as_bytes();
    let recovery_id =
        RecoveryId::from_byte(bytes[64]).ok_or(CryptoError::InvalidRecoveryId(bytes[64]))?;
    let sig = Signature::from_slice(&bytes[..64]).map_err(|_| CryptoError::InvalidSignature)?;

    let recovered = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|_| CryptoError::RecoveryFailed)?;
    Ok(compress(&recovered))
}

/// Check that `key` is a point on the curve.
pub fn validate_public_key(key: &PublicKey) -> Result<(), CryptoError> {
    parse_public_key(key).map(|_| ())
}

fn parse_public_key(key: &PublicKey) -> Result<VerifyingKey, CryptoError> {
    VerifyingKey::from_sec1_bytes(key.as_bytes()).map_err(|_| CryptoError::InvalidPublicKey)
}

fn compress(key: &VerifyingKey) -> PublicKey {
    let point = key.to_encoded_point(true);
    // A compressed SEC1 point is always 33 bytes.
    let mut bytes = [0u8; shared_types::PUBLIC_KEY_LENGTH];
    bytes.copy_from_slice(point.as_bytes());
    PublicKey(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_recover() {
        let keypair = Secp256k1KeyPair::generate();
        let digest = keccak256(b"Hello, secp256k1!");

        let signature = keypair.sign_recoverable(&digest).unwrap();
        let recovered = recover_public_key(&digest, &signature).unwrap();

        assert_eq!(recovered, keypair.public_key());
    }

    #[test]
    fn test_wrong_digest_recovers_other_key() {
        let keypair = Secp256k1KeyPair::generate();

        let signature = keypair.sign_recoverable(&keccak256(b"message1")).unwrap();
        let recovered = recover_public_key(&keccak256(b"message2"), &signature);

        match recovered {
            Ok(key) => assert_ne!(key, keypair.public_key()),
            Err(_) => {}
        }
    }

    #[test]
    fn test_deterministic_signatures() {
        let keypair = Secp256k1KeyPair::from_bytes([0xABu8; 32]).unwrap();
        let digest = keccak256(b"deterministic test");

        let sig1 = keypair.sign_recoverable(&digest).unwrap();
        let sig2 = keypair.sign_recoverable(&digest).unwrap();

        assert_eq!(sig1, sig2);
    }

    #[test]
    fn test_invalid_recovery_id_rejected() {
        let keypair = Secp256k1KeyPair::generate();
        let digest = keccak256(b"v");
        let mut bytes = *keypair.sign_recoverable(&digest).unwrap().as_bytes();
        bytes[64] = 9;

        let result = recover_public_key(&digest, &RecoverableSignature::from_bytes(bytes));
        assert_eq!(result, Err(CryptoError::InvalidRecoveryId(9)));
    }

    #[test]
    fn test_shared_key_is_symmetric() {
        let alice = Secp256k1KeyPair::generate();
        let bob = Secp256k1KeyPair::generate();

        let ab = alice.shared_key(&bob.public_key()).unwrap();
        let ba = bob.shared_key(&alice.public_key()).unwrap();
        assert_eq!(ab, ba);

        let carol = Secp256k1KeyPair::generate();
        assert_ne!(ab, alice.shared_key(&carol.public_key()).unwrap());
    }

    #[test]
    fn test_public_key_is_compressed() {
        let keypair = Secp256k1KeyPair::generate();
        let key = keypair.public_key();
        assert!(key.0[0] == 0x02 || key.0[0] == 0x03);
        assert!(validate_public_key(&key).is_ok());
    }

    #[test]
    fn test_off_curve_key_rejected() {
        let bogus = PublicKey([0x05; 33]);
        assert_eq!(
            validate_public_key(&bogus),
            Err(CryptoError::InvalidPublicKey)
        );
    }

    #[test]
    fn test_roundtrip_bytes() {
        let original = Secp256k1KeyPair::generate();
        let bytes = original.to_bytes();
        let restored = Secp256k1KeyPair::from_bytes(bytes).unwrap();

        assert_eq!(original.public_key(), restored.public_key());
    }
}
