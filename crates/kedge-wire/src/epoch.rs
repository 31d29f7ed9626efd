//! Epoch request/response codec
//!
//! `EpochRequest` (154 bytes):
//! - Byte 0: Version + Kind, Byte 1: Flags (must be zero)
//! - Bytes 2-9: Zone ID (LE)
//! - Bytes 10-17: Requester node ID (LE)
//! - Bytes 18-49: Requester Ed25519 public key
//! - Bytes 50-81: Requester ephemeral X25519 public key
//! - Bytes 82-89: Issued-at timestamp (LE, μs)
//! - Bytes 90-153: Ed25519 signature over bytes 2-89
//!
//! `EpochResponse` (222 bytes):
//! - Byte 0: Version + Kind, Byte 1: Flags (must be zero)
//! - Bytes 2-9: Zone ID (LE)
//! - Bytes 10-17: Anchor node ID (LE)
//! - Bytes 18-49: Anchor Ed25519 public key
//! - Bytes 50-81: Anchor ephemeral X25519 public key
//! - Bytes 82-89: Requester node ID (LE)
//! - Bytes 90-93: Epoch generation (LE)
//! - Bytes 94-101: Validity start (LE, μs)
//! - Bytes 102-109: Validity end (LE, μs)
//! - Bytes 110-157: Sealed epoch secret (32-byte secret + 16-byte AEAD tag)
//! - Bytes 158-221: Ed25519 signature over bytes 2-157
//!
//! The secret travels only inside the sealed box; the signature covers
//! the ciphertext, so authenticity and confidentiality come from two
//! independent layers.

use bytes::{BufMut, Bytes, BytesMut};
use kedge_core::{KedgeError, KedgeResult, NodeId, Timestamp, ZoneId};

use crate::{prelude_byte, MessageKind, WIRE_VERSION};

/// Total size of an epoch request
pub const EPOCH_REQUEST_SIZE: usize = 154;

/// Length of the request's signed region
pub const EPOCH_REQUEST_SIGNED_LEN: usize = 88;

/// Total size of an epoch response
pub const EPOCH_RESPONSE_SIZE: usize = 222;

/// Length of the response's signed region
pub const EPOCH_RESPONSE_SIGNED_LEN: usize = 156;

/// Sealed box size: 32-byte secret + 16-byte ChaCha20-Poly1305 tag
pub const SEALED_SECRET_LEN: usize = 48;

fn check_prelude(buf: &[u8], kind: MessageKind, what: &str) -> KedgeResult<()> {
    let version = buf[0] >> 4;
    if version != WIRE_VERSION {
        return Err(KedgeError::UnsupportedVersion(version));
    }
    if MessageKind::from_nibble(buf[0] & 0x0F) != Some(kind) {
        return Err(KedgeError::InvalidWireFormat(format!("not an {what}")));
    }
    if buf[1] != 0 {
        return Err(KedgeError::UnknownFlags(buf[1]));
    }
    Ok(())
}

/// Unicast request for the current epoch secret
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EpochRequest {
    pub zone: ZoneId,
    pub requester: NodeId,
    /// Requester's long-term Ed25519 verifying key
    pub public_key: [u8; 32],
    /// Fresh X25519 public key for this exchange only
    pub exchange_key: [u8; 32],
    pub issued_at: Timestamp,
    pub signature: [u8; 64],
}

impl EpochRequest {
    pub fn unsigned(
        zone: ZoneId,
        requester: NodeId,
        public_key: [u8; 32],
        exchange_key: [u8; 32],
        issued_at: Timestamp,
    ) -> Self {
        EpochRequest {
            zone,
            requester,
            public_key,
            exchange_key,
            issued_at,
            signature: [0u8; 64],
        }
    }

    /// Canonical bytes covered by the signature.
    pub fn signed_region(&self) -> [u8; EPOCH_REQUEST_SIGNED_LEN] {
        let mut buf = [0u8; EPOCH_REQUEST_SIGNED_LEN];
        buf[0..8].copy_from_slice(&self.zone.to_bytes());
        buf[8..16].copy_from_slice(&self.requester.to_bytes());
        buf[16..48].copy_from_slice(&self.public_key);
        buf[48..80].copy_from_slice(&self.exchange_key);
        buf[80..88].copy_from_slice(&self.issued_at.as_micros().to_le_bytes());
        buf
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(EPOCH_REQUEST_SIZE);
        buf.put_u8(prelude_byte(MessageKind::EpochRequest));
        buf.put_u8(0);
        buf.put_slice(&self.signed_region());
        buf.put_slice(&self.signature);
        buf.freeze()
    }

    pub fn parse(buf: &[u8]) -> KedgeResult<Self> {
        if buf.len() < EPOCH_REQUEST_SIZE {
            return Err(KedgeError::BufferTooShort {
                expected: EPOCH_REQUEST_SIZE,
                actual: buf.len(),
            });
        }
        if buf.len() != EPOCH_REQUEST_SIZE {
            return Err(KedgeError::InvalidWireFormat(
                "epoch request length mismatch".into(),
            ));
        }
        check_prelude(buf, MessageKind::EpochRequest, "epoch request")?;

        Ok(EpochRequest {
            zone: ZoneId::from_bytes(buf[2..10].try_into().unwrap()),
            requester: NodeId::from_bytes(buf[10..18].try_into().unwrap()),
            public_key: buf[18..50].try_into().unwrap(),
            exchange_key: buf[50..82].try_into().unwrap(),
            issued_at: Timestamp::from_micros(u64::from_le_bytes(
                buf[82..90].try_into().unwrap(),
            )),
            signature: buf[90..154].try_into().unwrap(),
        })
    }
}

/// The Anchor's sealed answer to an epoch request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EpochResponse {
    pub zone: ZoneId,
    pub anchor: NodeId,
    /// Anchor's long-term Ed25519 verifying key
    pub public_key: [u8; 32],
    /// Anchor's X25519 public key for this exchange only
    pub exchange_key: [u8; 32],
    /// Which requester this response answers
    pub requester: NodeId,
    pub generation: u32,
    pub valid_from: Timestamp,
    pub valid_until: Timestamp,
    /// Epoch secret sealed to the requester's exchange key
    pub sealed_secret: [u8; SEALED_SECRET_LEN],
    pub signature: [u8; 64],
}

impl EpochResponse {
    #[allow(clippy::too_many_arguments)]
    pub fn unsigned(
        zone: ZoneId,
        anchor: NodeId,
        public_key: [u8; 32],
        exchange_key: [u8; 32],
        requester: NodeId,
        generation: u32,
        valid_from: Timestamp,
        valid_until: Timestamp,
        sealed_secret: [u8; SEALED_SECRET_LEN],
    ) -> Self {
        EpochResponse {
            zone,
            anchor,
            public_key,
            exchange_key,
            requester,
            generation,
            valid_from,
            valid_until,
            sealed_secret,
            signature: [0u8; 64],
        }
    }

    /// Canonical bytes covered by the signature (sealed box included).
    pub fn signed_region(&self) -> [u8; EPOCH_RESPONSE_SIGNED_LEN] {
        let mut buf = [0u8; EPOCH_RESPONSE_SIGNED_LEN];
        buf[0..8].copy_from_slice(&self.zone.to_bytes());
        buf[8..16].copy_from_slice(&self.anchor.to_bytes());
        buf[16..48].copy_from_slice(&self.public_key);
        buf[48..80].copy_from_slice(&self.exchange_key);
        buf[80..88].copy_from_slice(&self.requester.to_bytes());
        buf[88..92].copy_from_slice(&self.generation.to_le_bytes());
        buf[92..100].copy_from_slice(&self.valid_from.as_micros().to_le_bytes());
        buf[100..108].copy_from_slice(&self.valid_until.as_micros().to_le_bytes());
        buf[108..156].copy_from_slice(&self.sealed_secret);
        buf
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(EPOCH_RESPONSE_SIZE);
        buf.put_u8(prelude_byte(MessageKind::EpochResponse));
        buf.put_u8(0);
        buf.put_slice(&self.signed_region());
        buf.put_slice(&self.signature);
        buf.freeze()
    }

    pub fn parse(buf: &[u8]) -> KedgeResult<Self> {
        if buf.len() < EPOCH_RESPONSE_SIZE {
            return Err(KedgeError::BufferTooShort {
                expected: EPOCH_RESPONSE_SIZE,
                actual: buf.len(),
            });
        }
        if buf.len() != EPOCH_RESPONSE_SIZE {
            return Err(KedgeError::InvalidWireFormat(
                "epoch response length mismatch".into(),
            ));
        }
        check_prelude(buf, MessageKind::EpochResponse, "epoch response")?;

        Ok(EpochResponse {
            zone: ZoneId::from_bytes(buf[2..10].try_into().unwrap()),
            anchor: NodeId::from_bytes(buf[10..18].try_into().unwrap()),
            public_key: buf[18..50].try_into().unwrap(),
            exchange_key: buf[50..82].try_into().unwrap(),
            requester: NodeId::from_bytes(buf[82..90].try_into().unwrap()),
            generation: u32::from_le_bytes(buf[90..94].try_into().unwrap()),
            valid_from: Timestamp::from_micros(u64::from_le_bytes(
                buf[94..102].try_into().unwrap(),
            )),
            valid_until: Timestamp::from_micros(u64::from_le_bytes(
                buf[102..110].try_into().unwrap(),
            )),
            sealed_secret: buf[110..158].try_into().unwrap(),
            signature: buf[158..222].try_into().unwrap(),
        })
    }
}
