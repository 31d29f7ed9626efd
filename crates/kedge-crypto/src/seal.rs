//! Sealed delivery of epoch secrets
//!
//! An epoch secret never crosses the network in the clear. It travels in a
//! sealed box: one-shot X25519 agreement, HKDF-SHA256 key derivation, then
//! ChaCha20-Poly1305. Both sides discard their exchange keys after a single
//! use, so a captured response discloses nothing later.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, SharedSecret};

use kedge_core::{KedgeError, KedgeResult, NodeId};

use crate::SECRET_SIZE;

/// Nonce size for ChaCha20-Poly1305
pub const SEAL_NONCE_SIZE: usize = 12;

/// Sealed box size: the epoch secret plus the AEAD tag
pub const SEALED_LEN: usize = SECRET_SIZE + 16;

/// Requester half of a one-shot exchange.
///
/// Created when a resync request goes out, consumed when the matching
/// response arrives. A failed open means a fresh request with a fresh key.
pub struct EpochExchange {
    secret: EphemeralSecret,
    public: PublicKey,
}

impl EpochExchange {
    /// Generate a fresh exchange key for one resync request.
    pub fn initiate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        EpochExchange { secret, public }
    }

    /// Public half, carried in the request.
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Open a sealed box using the responder's exchange public.
    pub fn open(
        self,
        responder_public: &[u8; 32],
        requester: NodeId,
        generation: u32,
        sealed: &[u8; SEALED_LEN],
    ) -> KedgeResult<[u8; SECRET_SIZE]> {
        let shared = self.secret.diffie_hellman(&PublicKey::from(*responder_public));
        let cipher = seal_cipher(&shared)?;
        let nonce = derive_seal_nonce(requester, generation);

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), sealed.as_slice())
            .map_err(|_| KedgeError::SealOpenFailed)?;
        if plaintext.len() != SECRET_SIZE {
            return Err(KedgeError::SealOpenFailed);
        }

        let mut secret = [0u8; SECRET_SIZE];
        secret.copy_from_slice(&plaintext);
        Ok(secret)
    }
}

impl std::fmt::Debug for EpochExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpochExchange")
            .field("public", &self.public.to_bytes())
            .finish_non_exhaustive()
    }
}

/// Seal an epoch secret for one requester.
///
/// The responder mints its own one-shot exchange key here; the returned
/// public half rides in the response next to the sealed box.
pub fn seal_secret(
    requester_exchange: &[u8; 32],
    requester: NodeId,
    generation: u32,
    secret: &[u8; SECRET_SIZE],
) -> KedgeResult<([u8; 32], [u8; SEALED_LEN])> {
    let responder_secret = EphemeralSecret::random_from_rng(OsRng);
    let responder_public = PublicKey::from(&responder_secret);

    let shared = responder_secret.diffie_hellman(&PublicKey::from(*requester_exchange));
    let cipher = seal_cipher(&shared)?;
    let nonce = derive_seal_nonce(requester, generation);

    let boxed = cipher
        .encrypt(Nonce::from_slice(&nonce), secret.as_slice())
        .map_err(|_| KedgeError::SealOpenFailed)?;
    let mut sealed = [0u8; SEALED_LEN];
    sealed.copy_from_slice(&boxed);

    Ok((responder_public.to_bytes(), sealed))
}

fn seal_cipher(shared: &SharedSecret) -> KedgeResult<ChaCha20Poly1305> {
    // Rejects the all-zero output of low-order exchange points.
    if !shared.was_contributory() {
        return Err(KedgeError::InvalidKeyMaterial);
    }

    let hkdf = Hkdf::<Sha256>::new(None, shared.as_bytes());
    let mut key = [0u8; SECRET_SIZE];
    hkdf.expand(b"KEDGE_EPOCH_SEAL_v0", &mut key)
        .expect("HKDF expand failed");

    Ok(ChaCha20Poly1305::new_from_slice(&key).expect("Invalid key size"))
}

/// Derive the seal nonce from response parameters.
///
/// Unique per sealing because the responder's exchange key is one-shot;
/// the requester id and generation bind the box to its response.
pub fn derive_seal_nonce(requester: NodeId, generation: u32) -> [u8; SEAL_NONCE_SIZE] {
    let mut nonce = [0u8; SEAL_NONCE_SIZE];
    nonce[0..8].copy_from_slice(&requester.to_bytes());
    nonce[8..12].copy_from_slice(&generation.to_le_bytes());
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let requester = NodeId::new(12345);
        let exchange = EpochExchange::initiate();
        let secret = [0x42u8; SECRET_SIZE];

        let (responder_public, sealed) =
            seal_secret(&exchange.public_bytes(), requester, 3, &secret).unwrap();
        let opened = exchange.open(&responder_public, requester, 3, &sealed).unwrap();

        assert_eq!(opened, secret);
    }

    #[test]
    fn test_wrong_responder_public_fails() {
        let requester = NodeId::new(1);
        let exchange = EpochExchange::initiate();
        let secret = [0x42u8; SECRET_SIZE];

        let (mut responder_public, sealed) =
            seal_secret(&exchange.public_bytes(), requester, 1, &secret).unwrap();
        responder_public[0] ^= 0x01;

        let result = exchange.open(&responder_public, requester, 1, &sealed);
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_requester_fails() {
        let exchange = EpochExchange::initiate();
        let secret = [0x42u8; SECRET_SIZE];

        let (responder_public, sealed) =
            seal_secret(&exchange.public_bytes(), NodeId::new(1), 1, &secret).unwrap();

        let result = exchange.open(&responder_public, NodeId::new(2), 1, &sealed);
        assert!(matches!(result, Err(KedgeError::SealOpenFailed)));
    }

    #[test]
    fn test_wrong_generation_fails() {
        let requester = NodeId::new(1);
        let exchange = EpochExchange::initiate();
        let secret = [0x42u8; SECRET_SIZE];

        let (responder_public, sealed) =
            seal_secret(&exchange.public_bytes(), requester, 1, &secret).unwrap();

        let result = exchange.open(&responder_public, requester, 2, &sealed);
        assert!(matches!(result, Err(KedgeError::SealOpenFailed)));
    }

    #[test]
    fn test_tampered_box_fails() {
        let requester = NodeId::new(1);
        let exchange = EpochExchange::initiate();
        let secret = [0x42u8; SECRET_SIZE];

        let (responder_public, mut sealed) =
            seal_secret(&exchange.public_bytes(), requester, 1, &secret).unwrap();
        sealed[SEALED_LEN - 1] ^= 0x01;

        let result = exchange.open(&responder_public, requester, 1, &sealed);
        assert!(matches!(result, Err(KedgeError::SealOpenFailed)));
    }

    #[test]
    fn test_low_order_exchange_point_rejected() {
        let secret = [0x42u8; SECRET_SIZE];
        let result = seal_secret(&[0u8; 32], NodeId::new(1), 1, &secret);
        assert!(matches!(result, Err(KedgeError::InvalidKeyMaterial)));
    }

    #[test]
    fn test_exchange_keys_are_distinct() {
        let a = EpochExchange::initiate();
        let b = EpochExchange::initiate();
        assert_ne!(a.public_bytes(), b.public_bytes());
    }

    #[test]
    fn test_nonce_derivation_distinct() {
        let n1 = derive_seal_nonce(NodeId::new(1), 1);
        let n2 = derive_seal_nonce(NodeId::new(1), 2);
        let n3 = derive_seal_nonce(NodeId::new(2), 1);

        assert_ne!(n1, n2);
        assert_ne!(n1, n3);
    }
}
