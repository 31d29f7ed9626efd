//! Peer table - the single owner of all peer records

use std::collections::HashMap;
use std::time::Duration;

use kedge_core::{AuthorityRank, NodeId, PeerRecord, Timestamp, TrustState};

/// What an upsert did to the table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First valid announcement from this identifier
    Inserted,
    /// Known identifier refreshed; trust transition, if any
    Updated { trust_changed: Option<TrustState> },
}

/// Last-known state of every peer in the zone
///
/// All mutation goes through [`upsert`](Self::upsert), [`mark_failure`]
/// (Self::mark_failure) and [`expire`](Self::expire); readers take sorted
/// snapshots.
#[derive(Debug)]
pub struct PeerTable {
    records: HashMap<NodeId, PeerRecord>,
    /// Consecutive failures before a peer is marked mistrusted
    failure_threshold: u32,
}

impl PeerTable {
    pub fn new(failure_threshold: u32) -> Self {
        PeerTable {
            records: HashMap::new(),
            failure_threshold,
        }
    }

    /// Get a peer record by ID
    pub fn get(&self, id: NodeId) -> Option<&PeerRecord> {
        self.records.get(&id)
    }

    /// Check if a peer is known
    pub fn contains(&self, id: NodeId) -> bool {
        self.records.contains_key(&id)
    }

    /// Get number of known peers
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fold a gate-accepted record into the table.
    ///
    /// Inserts unknown identifiers as given. For known identifiers the
    /// stored seniority and pinned public key are kept, liveness fields
    /// are refreshed, and the consecutive-failure counter resets. Trust
    /// never steps down here: a tag-verified record restores `Active`,
    /// anything weaker leaves the stored classification alone.
    pub fn upsert(&mut self, incoming: PeerRecord) -> UpsertOutcome {
        let Some(existing) = self.records.get_mut(&incoming.id) else {
            self.records.insert(incoming.id, incoming);
            return UpsertOutcome::Inserted;
        };

        let trust_before = existing.trust;
        existing.persona = incoming.persona;
        existing.status = incoming.status;
        existing.authority_score = incoming.authority_score;
        existing.addr = incoming.addr;
        existing.last_seen = incoming.last_seen;
        existing.failures = 0;
        if incoming.trust == TrustState::Active {
            existing.trust = TrustState::Active;
        }

        let trust_changed = (existing.trust != trust_before).then_some(existing.trust);
        UpsertOutcome::Updated { trust_changed }
    }

    /// Charge one integrity failure against a known identifier.
    ///
    /// Returns the new trust state when this failure crossed the
    /// mistrust threshold. Unknown identifiers leave no state behind.
    pub fn mark_failure(&mut self, id: NodeId) -> Option<TrustState> {
        let record = self.records.get_mut(&id)?;
        record.failures = record.failures.saturating_add(1);
        if record.failures >= self.failure_threshold && record.trust != TrustState::Mistrusted {
            record.trust = TrustState::Mistrusted;
            return Some(TrustState::Mistrusted);
        }
        None
    }

    /// Evict peers with no valid announcement inside `timeout`.
    ///
    /// Returns the evicted records sorted by identifier.
    pub fn expire(&mut self, now: Timestamp, timeout: Duration) -> Vec<PeerRecord> {
        let stale: Vec<NodeId> = self
            .records
            .values()
            .filter(|r| r.is_stale(now, timeout))
            .map(|r| r.id)
            .collect();

        let mut evicted: Vec<PeerRecord> = stale
            .into_iter()
            .filter_map(|id| self.records.remove(&id))
            .collect();
        evicted.sort_by_key(|r| r.id);
        evicted
    }

    /// Immutable copy of all records, sorted by identifier.
    pub fn snapshot(&self) -> Vec<PeerRecord> {
        let mut records: Vec<PeerRecord> = self.records.values().cloned().collect();
        records.sort_by_key(|r| r.id);
        records
    }

    /// Authority ranks of peers eligible for election right now.
    ///
    /// Candidacy ends the moment the silence budget is used up (at the
    /// boundary, not after it), so loss detection plus hysteresis stays
    /// inside the configured recovery bound. Eviction is separate and
    /// strictly later.
    pub fn candidate_ranks(&self, now: Timestamp, liveness_limit: Duration) -> Vec<AuthorityRank> {
        self.records
            .values()
            .filter(|r| r.is_anchor_candidate() && now.since(r.last_seen) < liveness_limit)
            .map(|r| r.rank())
            .collect()
    }
}
