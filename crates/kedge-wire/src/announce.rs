//! Pulse announcement codec
//!
//! Announcement layout (126 bytes bare, 162 bytes with epoch tag):
//! - Byte 0: Version (4 bits) + Kind (4 bits)
//! - Byte 1: Flags
//! - Bytes 2-9: Zone ID (LE)
//! - Bytes 10-17: Sender node ID (LE)
//! - Bytes 18-49: Sender Ed25519 public key
//! - Byte 50: Persona
//! - Byte 51: Status
//! - Bytes 52-53: Authority score (LE)
//! - Bytes 54-61: Local-seniority timestamp (LE, μs)
//! - Bytes 62-125: Ed25519 signature over bytes 2-61
//! - Bytes 126-129: Epoch generation (LE, iff `EPOCH_TAG`)
//! - Bytes 130-161: HMAC-SHA256 over bytes 2-125 ‖ generation (iff `EPOCH_TAG`)
//!
//! The prelude (version, kind, flags) is structural framing and stays
//! outside both authenticated regions; every semantic field is covered
//! by the signature, and the tag additionally binds the signature and
//! the epoch generation.

use bytes::{BufMut, Bytes, BytesMut};
use kedge_core::{
    KedgeError, KedgeResult, NodeId, NodeStatus, Persona, Timestamp, ZoneId,
};

use crate::{prelude_byte, MessageKind, PulseFlags, WIRE_VERSION};

/// Announcement size without the epoch extension
pub const ANNOUNCEMENT_BARE_SIZE: usize = 126;

/// Announcement size with generation + integrity tag attached
pub const ANNOUNCEMENT_TAGGED_SIZE: usize = 162;

const SIGNED_START: usize = 2;
const SIGNED_END: usize = 62;

/// Length of the signed region (zone through seniority)
pub const ANNOUNCEMENT_SIGNED_LEN: usize = SIGNED_END - SIGNED_START;

/// Length of the keyed-tag input: signed region + signature + generation
pub const ANNOUNCEMENT_TAG_MESSAGE_LEN: usize = ANNOUNCEMENT_SIGNED_LEN + 64 + 4;

/// Epoch extension carried by tag-bearing announcements
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EpochTag {
    /// Generation counter of the secret that keyed the tag
    pub generation: u32,
    /// HMAC-SHA256 over the tag message
    pub tag: [u8; 32],
}

/// One decoded pulse announcement
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Announcement {
    pub zone: ZoneId,
    pub sender: NodeId,
    pub public_key: [u8; 32],
    pub persona: Persona,
    pub status: NodeStatus,
    pub authority_score: u16,
    pub seniority: Timestamp,
    /// Ed25519 signature over the signed region
    pub signature: [u8; 64],
    /// Present once the sender is epoch-synced
    pub epoch: Option<EpochTag>,
}

impl Announcement {
    /// Build an announcement with an empty signature, ready for signing.
    #[allow(clippy::too_many_arguments)]
    pub fn unsigned(
        zone: ZoneId,
        sender: NodeId,
        public_key: [u8; 32],
        persona: Persona,
        status: NodeStatus,
        authority_score: u16,
        seniority: Timestamp,
    ) -> Self {
        Announcement {
            zone,
            sender,
            public_key,
            persona,
            status,
            authority_score,
            seniority,
            signature: [0u8; 64],
            epoch: None,
        }
    }

    /// Canonical bytes covered by the Ed25519 signature.
    pub fn signed_region(&self) -> [u8; ANNOUNCEMENT_SIGNED_LEN] {
        let mut buf = [0u8; ANNOUNCEMENT_SIGNED_LEN];
        buf[0..8].copy_from_slice(&self.zone.to_bytes());
        buf[8..16].copy_from_slice(&self.sender.to_bytes());
        buf[16..48].copy_from_slice(&self.public_key);
        buf[48] = self.persona.to_byte();
        buf[49] = self.status.to_byte();
        buf[50..52].copy_from_slice(&self.authority_score.to_le_bytes());
        buf[52..60].copy_from_slice(&self.seniority.as_micros().to_le_bytes());
        buf
    }

    /// Canonical bytes covered by the keyed integrity tag: the signed
    /// region, the signature, and the epoch generation.
    pub fn tag_message(&self, generation: u32) -> [u8; ANNOUNCEMENT_TAG_MESSAGE_LEN] {
        let mut buf = [0u8; ANNOUNCEMENT_TAG_MESSAGE_LEN];
        buf[0..60].copy_from_slice(&self.signed_region());
        buf[60..124].copy_from_slice(&self.signature);
        buf[124..128].copy_from_slice(&generation.to_le_bytes());
        buf
    }

    /// Serialize to wire bytes.
    pub fn encode(&self) -> Bytes {
        let size = if self.epoch.is_some() {
            ANNOUNCEMENT_TAGGED_SIZE
        } else {
            ANNOUNCEMENT_BARE_SIZE
        };
        let mut flags = PulseFlags::NONE;
        flags.set_epoch_tag(self.epoch.is_some());

        let mut buf = BytesMut::with_capacity(size);
        buf.put_u8(prelude_byte(MessageKind::Pulse));
        buf.put_u8(flags.0);
        buf.put_slice(&self.signed_region());
        buf.put_slice(&self.signature);
        if let Some(epoch) = &self.epoch {
            buf.put_u32_le(epoch.generation);
            buf.put_slice(&epoch.tag);
        }
        buf.freeze()
    }

    /// Parse from wire bytes. Rejects anything ill-formed outright:
    /// bad version/kind/flags, unknown persona or status bytes, and any
    /// length that is not exactly bare or tagged.
    pub fn parse(buf: &[u8]) -> KedgeResult<Self> {
        if buf.len() < ANNOUNCEMENT_BARE_SIZE {
            return Err(KedgeError::BufferTooShort {
                expected: ANNOUNCEMENT_BARE_SIZE,
                actual: buf.len(),
            });
        }

        let version = buf[0] >> 4;
        if version != WIRE_VERSION {
            return Err(KedgeError::UnsupportedVersion(version));
        }
        if MessageKind::from_nibble(buf[0] & 0x0F) != Some(MessageKind::Pulse) {
            return Err(KedgeError::InvalidWireFormat("not a pulse".into()));
        }

        let flags = PulseFlags::parse(buf[1])?;
        let expected = if flags.has_epoch_tag() {
            ANNOUNCEMENT_TAGGED_SIZE
        } else {
            ANNOUNCEMENT_BARE_SIZE
        };
        if buf.len() != expected {
            return Err(KedgeError::InvalidWireFormat(format!(
                "pulse length {} does not match flags (expected {})",
                buf.len(),
                expected
            )));
        }

        let zone = ZoneId::from_bytes(buf[2..10].try_into().unwrap());
        let sender = NodeId::from_bytes(buf[10..18].try_into().unwrap());
        let public_key: [u8; 32] = buf[18..50].try_into().unwrap();
        let persona = Persona::from_byte(buf[50]).ok_or(KedgeError::UnknownPersona(buf[50]))?;
        let status = NodeStatus::from_byte(buf[51]).ok_or(KedgeError::UnknownStatus(buf[51]))?;
        let authority_score = u16::from_le_bytes([buf[52], buf[53]]);
        let seniority =
            Timestamp::from_micros(u64::from_le_bytes(buf[54..62].try_into().unwrap()));
        let signature: [u8; 64] = buf[62..126].try_into().unwrap();

        let epoch = if flags.has_epoch_tag() {
            let generation = u32::from_le_bytes(buf[126..130].try_into().unwrap());
            let tag: [u8; 32] = buf[130..162].try_into().unwrap();
            Some(EpochTag { generation, tag })
        } else {
            None
        };

        Ok(Announcement {
            zone,
            sender,
            public_key,
            persona,
            status,
            authority_score,
            seniority,
            signature,
            epoch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> Announcement {
        let mut ann = Announcement::unsigned(
            ZoneId::new(0xAA),
            NodeId::new(0x12345678_9ABCDEF0),
            [7u8; 32],
            Persona::Relay,
            NodeStatus::Stressed,
            70,
            Timestamp::from_micros(1_700_000_000_000_000),
        );
        ann.signature = [9u8; 64];
        ann
    }

    #[test]
    fn test_bare_roundtrip() {
        let ann = sample();
        let bytes = ann.encode();
        assert_eq!(bytes.len(), ANNOUNCEMENT_BARE_SIZE);

        let parsed = Announcement::parse(&bytes).unwrap();
        assert_eq!(parsed, ann);
    }

    #[test]
    fn test_tagged_roundtrip() {
        let mut ann = sample();
        ann.epoch = Some(EpochTag {
            generation: 42,
            tag: [3u8; 32],
        });
        let bytes = ann.encode();
        assert_eq!(bytes.len(), ANNOUNCEMENT_TAGGED_SIZE);

        let parsed = Announcement::parse(&bytes).unwrap();
        assert_eq!(parsed, ann);
    }

    #[test]
    fn test_truncated_rejected() {
        let bytes = sample().encode();
        for len in [0, 1, 10, ANNOUNCEMENT_BARE_SIZE - 1] {
            assert!(Announcement::parse(&bytes[..len]).is_err());
        }
    }

    #[test]
    fn test_length_flag_mismatch_rejected() {
        // Tagged length with the flag cleared
        let mut ann = sample();
        ann.epoch = Some(EpochTag {
            generation: 1,
            tag: [0u8; 32],
        });
        let mut bytes = ann.encode().to_vec();
        bytes[1] = 0;
        assert!(Announcement::parse(&bytes).is_err());

        // Bare length with the flag set
        let mut bytes = sample().encode().to_vec();
        bytes[1] = PulseFlags::EPOCH_TAG;
        assert!(Announcement::parse(&bytes).is_err());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = sample().encode().to_vec();
        bytes.push(0);
        assert!(Announcement::parse(&bytes).is_err());
    }

    #[test]
    fn test_unknown_persona_rejected() {
        let mut bytes = sample().encode().to_vec();
        bytes[50] = 0x7F;
        assert!(matches!(
            Announcement::parse(&bytes),
            Err(KedgeError::UnknownPersona(0x7F))
        ));
    }

    #[test]
    fn test_unknown_status_rejected() {
        let mut bytes = sample().encode().to_vec();
        bytes[51] = 0x30;
        assert!(matches!(
            Announcement::parse(&bytes),
            Err(KedgeError::UnknownStatus(0x30))
        ));
    }

    #[test]
    fn test_signed_region_tracks_semantic_fields() {
        let a = sample();
        let mut b = sample();
        b.authority_score = 71;
        assert_ne!(a.signed_region(), b.signed_region());

        // The signature itself is outside the signed region
        let mut c = sample();
        c.signature = [1u8; 64];
        assert_eq!(a.signed_region(), c.signed_region());
    }

    #[test]
    fn test_tag_message_binds_signature_and_generation() {
        let a = sample();
        let mut b = sample();
        b.signature = [1u8; 64];
        assert_ne!(a.tag_message(5), b.tag_message(5));
        assert_ne!(a.tag_message(5), a.tag_message(6));
    }

    proptest! {
        #[test]
        fn prop_parse_never_panics(data in proptest::collection::vec(any::<u8>(), 0..400)) {
            let _ = Announcement::parse(&data);
        }

        #[test]
        fn prop_corrupted_prelude_rejected(corrupt in 1u8..=255) {
            let mut bytes = sample().encode().to_vec();
            bytes[0] ^= corrupt;
            // Any change to version or kind must fail parsing
            prop_assert!(Announcement::parse(&bytes).is_err());
        }
    }
}
