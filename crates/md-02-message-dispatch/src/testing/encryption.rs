//! In-memory encryption collaborator.
//!
//! Each node owns an identity key and a rotating device prekey. Frames:
//!
//! ```text
//! direct: "MDEN" || 0x01 || recipient_prekey(33) || seal(ecdh(sender_id, recipient_prekey), plaintext)
//! dh:     "MDEN" || 0x02 || seal(ecdh(sender_id, recipient_id), sender_prekey(33) || plaintext)
//! ```
//!
//! A bundle advertisement is a DH frame with an empty plaintext. A direct
//! frame addressed to a prekey the receiver no longer holds is a session
//! miss.

use parking_lot::Mutex;
use shared_crypto::{open, seal, Secp256k1KeyPair, SecretKey};
use shared_types::{PublicKey, PUBLIC_KEY_LENGTH};
use std::collections::HashMap;

use crate::domain::{DecryptResult, EncryptionError, Identity, MessageSpec, SharedSecret};
use crate::ports::outbound::EncryptionProtocol;

const FRAME_MAGIC: [u8; 4] = *b"MDEN";
const KIND_DIRECT: u8 = 0x01;
const KIND_DH: u8 = 0x02;
const HEADER_LENGTH: usize = FRAME_MAGIC.len() + 1;

/// Minimum seconds between two advertisements to the same peer.
pub const ADVERTISEMENT_COOLDOWN_SECONDS: u64 = 7200;

#[derive(Debug)]
pub struct InMemoryEncryption {
    device: Mutex<Secp256k1KeyPair>,
    /// Peer identity to that peer's current prekey.
    bundles: Mutex<HashMap<PublicKey, PublicKey>>,
    advertised: Mutex<HashMap<PublicKey, u64>>,
    negotiated: Mutex<HashMap<PublicKey, [u8; 32]>>,
}

impl Default for InMemoryEncryption {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEncryption {
    pub fn new() -> Self {
        Self {
            device: Mutex::new(Secp256k1KeyPair::generate()),
            bundles: Mutex::new(HashMap::new()),
            advertised: Mutex::new(HashMap::new()),
            negotiated: Mutex::new(HashMap::new()),
        }
    }

    /// This node's current prekey.
    pub fn bundle(&self) -> PublicKey {
        self.device.lock().public_key()
    }

    /// Learn `peer`'s prekey.
    pub fn add_bundle(&self, peer: PublicKey, prekey: PublicKey) {
        self.bundles.lock().insert(peer, prekey);
    }

    /// Whether a prekey for `peer` is known.
    pub fn knows(&self, peer: &PublicKey) -> bool {
        self.bundles.lock().contains_key(peer)
    }

    /// Replace the device prekey. Peers holding the old one lose their
    /// session until they see a new bundle.
    pub fn rotate_device(&self) {
        *self.device.lock() = Secp256k1KeyPair::generate();
    }

    /// Last advertisement time to `peer`.
    pub fn last_advertised(&self, peer: &PublicKey) -> Option<u64> {
        self.advertised.lock().get(peer).copied()
    }

    /// Number of peers with recorded advertisements.
    pub fn advertised_peers(&self) -> usize {
        self.advertised.lock().len()
    }

    /// Exchange bundles between two nodes.
    pub fn introduce(a: (&PublicKey, &Self), b: (&PublicKey, &Self)) {
        a.1.add_bundle(*b.0, b.1.bundle());
        b.1.add_bundle(*a.0, a.1.bundle());
    }

    fn frame(kind: u8, body: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(HEADER_LENGTH + body.len());
        frame.extend_from_slice(&FRAME_MAGIC);
        frame.push(kind);
        frame.extend_from_slice(body);
        frame
    }

    fn decrypt_direct(
        &self,
        identity: &Identity,
        sender: &PublicKey,
        body: &[u8],
    ) -> DecryptResult {
        if body.len() < PUBLIC_KEY_LENGTH {
            return DecryptResult::Failed(EncryptionError::Decrypt("short direct frame".into()));
        }
        let (target, sealed) = body.split_at(PUBLIC_KEY_LENGTH);

        let key = {
            let device = self.device.lock();
            if target != device.public_key().as_bytes() {
                return DecryptResult::NoSession;
            }
            match device.shared_key(sender) {
                Ok(key) => key,
                Err(e) => return DecryptResult::Failed(EncryptionError::Decrypt(e.to_string())),
            }
        };

        let plaintext = match open(&SecretKey::from_bytes(key), sealed) {
            Ok(plaintext) => plaintext,
            Err(e) => return DecryptResult::Failed(EncryptionError::Decrypt(e.to_string())),
        };

        let mut negotiated = Vec::new();
        if !self.negotiated.lock().contains_key(sender) {
            if let Ok(secret) = identity.shared_key(sender) {
                self.negotiated.lock().insert(*sender, secret);
                negotiated.push(SharedSecret {
                    identity: *sender,
                    key: secret,
                });
            }
        }
        DecryptResult::Decrypted {
            plaintext,
            negotiated,
        }
    }

    fn decrypt_dh(&self, identity: &Identity, sender: &PublicKey, sealed: &[u8]) -> DecryptResult {
        let key = match identity.shared_key(sender) {
            Ok(key) => key,
            Err(e) => return DecryptResult::Failed(EncryptionError::Decrypt(e.to_string())),
        };
        let body = match open(&SecretKey::from_bytes(key), sealed) {
            Ok(body) => body,
            Err(e) => return DecryptResult::Failed(EncryptionError::Decrypt(e.to_string())),
        };
        if body.len() < PUBLIC_KEY_LENGTH {
            return DecryptResult::Failed(EncryptionError::Bundle("missing prekey".into()));
        }
        let (prekey, plaintext) = body.split_at(PUBLIC_KEY_LENGTH);
        match PublicKey::from_slice(prekey) {
            Ok(prekey) => self.add_bundle(*sender, prekey),
            Err(e) => return DecryptResult::Failed(EncryptionError::Bundle(e.to_string())),
        }
        DecryptResult::decrypted(plaintext.to_vec())
    }
}

impl EncryptionProtocol for InMemoryEncryption {
    fn build_direct_message(
        &self,
        identity: &Identity,
        recipient: &PublicKey,
        plaintext: &[u8],
    ) -> Result<MessageSpec, EncryptionError> {
        let prekey = self
            .bundles
            .lock()
            .get(recipient)
            .copied()
            .ok_or(EncryptionError::NoSession { peer: *recipient })?;
        let key = identity
            .shared_key(&prekey)
            .map_err(|e| EncryptionError::Encrypt(e.to_string()))?;
        let sealed = seal(&SecretKey::from_bytes(key), plaintext)
            .map_err(|e| EncryptionError::Encrypt(e.to_string()))?;

        let mut body = prekey.as_bytes().to_vec();
        body.extend_from_slice(&sealed);
        let spec = MessageSpec::new(Self::frame(KIND_DIRECT, &body));

        let secret = self.negotiated.lock().get(recipient).copied();
        Ok(match secret {
            Some(key) => spec.with_shared_secret(SharedSecret {
                identity: *recipient,
                key,
            }),
            None => spec,
        })
    }

    fn build_dh_message(
        &self,
        identity: &Identity,
        recipient: &PublicKey,
        plaintext: &[u8],
    ) -> Result<MessageSpec, EncryptionError> {
        let key = identity
            .shared_key(recipient)
            .map_err(|e| EncryptionError::Encrypt(e.to_string()))?;
        let mut body = self.bundle().as_bytes().to_vec();
        body.extend_from_slice(plaintext);
        let sealed =
            seal(&SecretKey::from_bytes(key), &body).map_err(|e| EncryptionError::Encrypt(e.to_string()))?;
        Ok(MessageSpec::new(Self::frame(KIND_DH, &sealed)))
    }

    fn should_advertise_bundle(&self, peer: &PublicKey, now: u64) -> Result<bool, EncryptionError> {
        Ok(match self.advertised.lock().get(peer) {
            Some(last) => now >= last.saturating_add(ADVERTISEMENT_COOLDOWN_SECONDS),
            None => true,
        })
    }

    fn build_bundle_advertise_message(
        &self,
        identity: &Identity,
        peer: &PublicKey,
    ) -> Result<MessageSpec, EncryptionError> {
        self.build_dh_message(identity, peer, &[])
    }

    fn confirm_bundle_advertisement(&self, peer: &PublicKey, now: u64) {
        self.advertised
            .lock()
            .entry(*peer)
            .and_modify(|last| *last = (*last).max(now))
            .or_insert(now);
    }

    fn decrypt(&self, identity: &Identity, sender: &PublicKey, payload: &[u8]) -> DecryptResult {
        if payload.len() < HEADER_LENGTH || payload[..FRAME_MAGIC.len()] != FRAME_MAGIC {
            return DecryptResult::Failed(EncryptionError::NotEncrypted);
        }
        let body = &payload[HEADER_LENGTH..];
        match payload[FRAME_MAGIC.len()] {
            KIND_DIRECT => self.decrypt_direct(identity, sender, body),
            KIND_DH => self.decrypt_dh(identity, sender, body),
            kind => DecryptResult::Failed(EncryptionError::Decrypt(format!(
                "unknown frame kind {kind}"
            ))),
        }
    }
}
