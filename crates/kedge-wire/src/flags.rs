//! Flag byte for KEDGE wire messages

use kedge_core::{KedgeError, KedgeResult};

/// Message flags (1 byte)
///
/// Decoders are strict: any bit outside the defined set rejects the
/// packet. Wire evolution goes through the version nibble, not through
/// tolerated unknown flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PulseFlags(pub u8);

impl PulseFlags {
    pub const NONE: PulseFlags = PulseFlags(0);

    // Flag bits
    pub const EPOCH_TAG: u8 = 0b0000_0001;

    /// All bits with a defined meaning
    pub const DEFINED: u8 = Self::EPOCH_TAG;

    #[inline]
    pub fn new(bits: u8) -> Self {
        PulseFlags(bits)
    }

    /// Parse a received flag byte, rejecting undefined bits.
    pub fn parse(bits: u8) -> KedgeResult<Self> {
        if bits & !Self::DEFINED != 0 {
            return Err(KedgeError::UnknownFlags(bits));
        }
        Ok(PulseFlags(bits))
    }

    #[inline]
    pub fn has_epoch_tag(self) -> bool {
        self.0 & Self::EPOCH_TAG != 0
    }

    #[inline]
    pub fn set_epoch_tag(&mut self, value: bool) {
        if value {
            self.0 |= Self::EPOCH_TAG;
        } else {
            self.0 &= !Self::EPOCH_TAG;
        }
    }
}

impl From<u8> for PulseFlags {
    fn from(bits: u8) -> Self {
        PulseFlags(bits)
    }
}

impl From<PulseFlags> for u8 {
    fn from(flags: PulseFlags) -> Self {
        flags.0
    }
}
