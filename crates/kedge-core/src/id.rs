//! Identity types for the KEDGE protocol
//!
//! All identifiers are 64-bit for wire efficiency while maintaining
//! sufficient uniqueness for practical mesh sizes.

use std::fmt;

/// Node identity - cryptographic fingerprint (truncated hash of the
/// node's Ed25519 verifying key)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodeId(pub u64);

impl NodeId {
    pub const ZERO: NodeId = NodeId(0);

    #[inline]
    pub fn new(id: u64) -> Self {
        NodeId(id)
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        NodeId(u64::from_le_bytes(bytes))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({:016x})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Zone identity - deployment scope binding (truncated hash of the
/// configured zone name)
///
/// Every wire message carries the sender's zone; traffic from other
/// zones is discarded before any further processing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ZoneId(pub u64);

impl ZoneId {
    pub const ZERO: ZoneId = ZoneId(0);

    #[inline]
    pub fn new(id: u64) -> Self {
        ZoneId(id)
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        ZoneId(u64::from_le_bytes(bytes))
    }
}

impl fmt::Debug for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Zone({:016x})", self.0)
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_roundtrip() {
        let id = NodeId::new(0xDEADBEEF_CAFEBABE);
        let bytes = id.to_bytes();
        let recovered = NodeId::from_bytes(bytes);
        assert_eq!(id, recovered);
    }

    #[test]
    fn test_zone_id_roundtrip() {
        let id = ZoneId::new(0x0123_4567_89AB_CDEF);
        assert_eq!(ZoneId::from_bytes(id.to_bytes()), id);
    }

    #[test]
    fn test_node_id_ordering_is_total() {
        let a = NodeId::new(1);
        let b = NodeId::new(2);
        assert!(b > a);
        assert_eq!(a.cmp(&a), std::cmp::Ordering::Equal);
    }
}
