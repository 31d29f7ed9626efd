//! Peer records - the data model behind the peer table
//!
//! Records are created and mutated only by the integrity gate / peer
//! table; everything else sees cloned snapshots.

use std::net::SocketAddr;

use crate::{AuthorityRank, NodeId, NodeStatus, Persona, Timestamp};

/// Local trust classification of a peer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum TrustState {
    /// Signature-valid but never tag-verified (pre-epoch bootstrap)
    #[default]
    Unverified = 0x00,

    /// Tag-verified against the shared epoch secret
    Active = 0x01,

    /// Crossed the consecutive integrity-failure threshold
    ///
    /// An internal signal for local display and candidate filtering,
    /// never broadcast. A later tag-verified announcement restores
    /// `Active`.
    Mistrusted = 0x02,
}

impl TrustState {
    pub fn label(self) -> &'static str {
        match self {
            TrustState::Unverified => "unverified",
            TrustState::Active => "active",
            TrustState::Mistrusted => "mistrusted",
        }
    }
}

/// Last-known state of one peer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerRecord {
    /// Identifier (hash of `public_key`)
    pub id: NodeId,
    /// Ed25519 verifying key pinned from the first valid announcement
    pub public_key: [u8; 32],
    /// Deployment role
    pub persona: Persona,
    /// Self-reported health
    pub status: NodeStatus,
    /// Fixed provisioning score
    pub authority_score: u16,
    /// First-activation time - write-once, never overwritten by updates
    pub seniority: Timestamp,
    /// Source address of the latest valid announcement
    pub addr: SocketAddr,
    /// When the latest valid announcement arrived
    pub last_seen: Timestamp,
    /// Local trust classification
    pub trust: TrustState,
    /// Consecutive integrity failures since the last valid announcement
    pub failures: u32,
}

impl PeerRecord {
    /// The peer's authority tuple for election
    #[inline]
    pub fn rank(&self) -> AuthorityRank {
        AuthorityRank::new(self.authority_score, self.seniority, self.id)
    }

    /// May this peer be elected Anchor right now?
    ///
    /// Persona eligibility is static; mistrust suspends eligibility until
    /// the peer produces a tag-verified announcement again.
    pub fn is_anchor_candidate(&self) -> bool {
        self.persona.anchor_eligible() && self.trust != TrustState::Mistrusted
    }

    /// Has this record gone silent past `timeout`?
    #[inline]
    pub fn is_stale(&self, now: Timestamp, timeout: std::time::Duration) -> bool {
        now.since(self.last_seen) > timeout
    }
}
