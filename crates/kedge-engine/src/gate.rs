//! Integrity gate - admission control for inbound announcements
//!
//! Every pulse passes through one staged pipeline before it may touch
//! the peer table. The outcome is a verdict, not an error: rejected
//! traffic is dropped without any reply (an attacker probing the gate
//! learns nothing), and a valid-but-unverifiable tag downgrades to
//! an advisory "unsynced" outcome instead of punishing the sender.
//!
//! Only failures that are cryptographically bound to the claimed
//! identifier charge that identifier's failure counter. A forged claim
//! that never proves control of the identifier must not be able to
//! mistrust-poison a legitimate peer.

use std::net::SocketAddr;

use kedge_core::{NodeId, PeerRecord, Timestamp, TrustState, ZoneId};
use kedge_crypto::PublicIdentity;
use kedge_wire::Announcement;

use crate::epochs::EpochKeyManager;
use crate::table::PeerTable;

/// Why an announcement was silently dropped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Zone identifier does not match ours
    ForeignZone,
    /// Our own multicast echo
    SelfEcho,
    /// Verifying key bytes are not a valid Ed25519 point
    MalformedKey,
    /// Claimed identifier is not the hash of the presented key
    IdentityMismatch,
    /// Identifier already pinned to a different verifying key
    KeyCollision,
    /// Ed25519 signature does not verify
    BadSignature,
}

impl DropReason {
    /// Does this failure count against the sender's identifier?
    ///
    /// True only where the presented key actually binds to the claimed
    /// identifier, so the charge cannot be planted by a third party
    /// spoofing the sender field.
    pub fn charges_sender(self) -> bool {
        matches!(self, DropReason::KeyCollision | DropReason::BadSignature)
    }

    pub fn label(self) -> &'static str {
        match self {
            DropReason::ForeignZone => "foreign-zone",
            DropReason::SelfEcho => "self-echo",
            DropReason::MalformedKey => "malformed-key",
            DropReason::IdentityMismatch => "identity-mismatch",
            DropReason::KeyCollision => "key-collision",
            DropReason::BadSignature => "bad-signature",
        }
    }
}

/// Outcome of gating one announcement
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateVerdict {
    /// Both proofs hold (or the mesh is still pre-epoch): admit this record.
    Accept { record: PeerRecord },

    /// Signature valid but the epoch tag is missing or unverifiable.
    ///
    /// The table stays untouched; the caller should schedule a
    /// rate-limited epoch resync toward its believed Anchor.
    Unsynced,

    /// Drop without reply.
    Reject(DropReason),
}

/// Stateless admission pipeline, parameterized by local identity
#[derive(Debug)]
pub struct IntegrityGate {
    zone: ZoneId,
    local: NodeId,
}

impl IntegrityGate {
    pub fn new(zone: ZoneId, local: NodeId) -> Self {
        IntegrityGate { zone, local }
    }

    /// Run one announcement through the pipeline.
    ///
    /// Reads the table only for key pinning; all mutation (upsert,
    /// failure charging) is the caller's job so the charge policy in
    /// [`DropReason::charges_sender`] stays in one place.
    pub fn assess(
        &self,
        ann: &Announcement,
        src: SocketAddr,
        table: &PeerTable,
        epochs: &EpochKeyManager,
        now: Timestamp,
    ) -> GateVerdict {
        // Stage 1: zone scope
        if ann.zone != self.zone {
            return GateVerdict::Reject(DropReason::ForeignZone);
        }

        // Stage 2: our own echo
        if ann.sender == self.local {
            return GateVerdict::Reject(DropReason::SelfEcho);
        }

        // Stage 3: key must decode to a usable verifying key
        let Some(identity) = PublicIdentity::from_bytes(&ann.public_key) else {
            return GateVerdict::Reject(DropReason::MalformedKey);
        };

        // Stage 4: the claimed identifier must be derived from that key
        if identity.node_id() != ann.sender {
            return GateVerdict::Reject(DropReason::IdentityMismatch);
        }

        // Stage 5: first-seen key wins; a later claimant with a different
        // key is rejected no matter what else checks out
        if let Some(existing) = table.get(ann.sender) {
            if existing.public_key != ann.public_key {
                return GateVerdict::Reject(DropReason::KeyCollision);
            }
        }

        // Stage 6: origin proof
        if !identity.verify(&ann.signed_region(), &ann.signature) {
            return GateVerdict::Reject(DropReason::BadSignature);
        }

        // Stage 7: epoch membership proof
        match &ann.epoch {
            Some(extension) if epochs.synced() => {
                let message = ann.tag_message(extension.generation);
                if epochs.verify(extension.generation, &message, &extension.tag, now) {
                    GateVerdict::Accept {
                        record: build_record(ann, src, now, TrustState::Active),
                    }
                } else {
                    GateVerdict::Unsynced
                }
            }
            // Tagged traffic while we hold no secret: we are the stale side.
            Some(_) => GateVerdict::Unsynced,
            // Bare pulse while the mesh already has an epoch: the sender is behind.
            None if epochs.synced() => GateVerdict::Unsynced,
            // Pre-epoch bootstrap: admit on the signature alone.
            None => GateVerdict::Accept {
                record: build_record(ann, src, now, TrustState::Unverified),
            },
        }
    }
}

fn build_record(
    ann: &Announcement,
    src: SocketAddr,
    now: Timestamp,
    trust: TrustState,
) -> PeerRecord {
    PeerRecord {
        id: ann.sender,
        public_key: ann.public_key,
        persona: ann.persona,
        status: ann.status,
        authority_score: ann.authority_score,
        seniority: ann.seniority,
        addr: src,
        last_seen: now,
        trust,
        failures: 0,
    }
}
