//! KEDGE Wire Protocol - Binary packet format
//!
//! This crate implements the wire format for KEDGE packets:
//! - Pulse announcements (signed, optionally epoch-tagged)
//! - Epoch request/response for out-of-band key synchronization
//!
//! All messages share a 2-byte prelude: byte 0 packs the wire version
//! (high nibble) and message kind (low nibble), byte 1 carries flags.
//! Field order is canonical because signatures cover exact bytes.

pub mod announce;
pub mod epoch;
pub mod flags;

pub use announce::*;
pub use epoch::*;
pub use flags::*;

use kedge_core::{KedgeError, KedgeResult};

/// Current wire protocol version
pub const WIRE_VERSION: u8 = 0;

/// Upper bound on any KEDGE datagram; the largest message
/// (`EpochResponse`, 222 bytes) fits with room to spare, and everything
/// stays far below the IPv6 minimum MTU.
pub const MAX_DATAGRAM_SIZE: usize = 512;

/// Message kind carried in the low nibble of byte 0
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Periodic signed announcement
    Pulse = 0x0,
    /// Unicast request for the current epoch secret
    EpochRequest = 0x1,
    /// Anchor's sealed answer to an epoch request
    EpochResponse = 0x2,
}

impl MessageKind {
    pub fn from_nibble(n: u8) -> Option<Self> {
        match n {
            0x0 => Some(MessageKind::Pulse),
            0x1 => Some(MessageKind::EpochRequest),
            0x2 => Some(MessageKind::EpochResponse),
            _ => None,
        }
    }

    #[inline]
    pub fn to_nibble(self) -> u8 {
        self as u8
    }
}

/// Inspect the version/kind byte without decoding the body.
///
/// This is the first thing done to every received datagram; anything
/// that fails here is dropped before further processing.
pub fn peek_kind(buf: &[u8]) -> KedgeResult<MessageKind> {
    if buf.is_empty() {
        return Err(KedgeError::BufferTooShort {
            expected: 1,
            actual: 0,
        });
    }
    let version = buf[0] >> 4;
    if version != WIRE_VERSION {
        return Err(KedgeError::UnsupportedVersion(version));
    }
    MessageKind::from_nibble(buf[0] & 0x0F).ok_or(KedgeError::UnknownMessageKind(buf[0] & 0x0F))
}

/// Compose the version/kind byte for an outbound message.
#[inline]
pub(crate) fn prelude_byte(kind: MessageKind) -> u8 {
    (WIRE_VERSION << 4) | kind.to_nibble()
}
