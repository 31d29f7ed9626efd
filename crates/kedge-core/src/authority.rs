//! Authority ordering for Anchor election
//!
//! Every node ranks all known candidates with the same pure comparison,
//! so the mesh converges on one Anchor without exchanging votes. The
//! ordering key is `(authority_score, -seniority, identifier)` evaluated
//! lexicographically: higher score wins, ties fall to the earlier-activated
//! node, and the identifier settles exact ties deterministically.

use std::cmp::Ordering;

use crate::{NodeId, Timestamp};

/// The comparable authority tuple of one candidate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AuthorityRank {
    /// Fixed score assigned at provisioning
    pub score: u16,
    /// Write-once first-activation time; earlier outranks later
    pub seniority: Timestamp,
    /// Final deterministic tie-break
    pub id: NodeId,
}

impl AuthorityRank {
    pub fn new(score: u16, seniority: Timestamp, id: NodeId) -> Self {
        AuthorityRank {
            score,
            seniority,
            id,
        }
    }

    /// Does this rank strictly outrank `other`?
    #[inline]
    pub fn outranks(&self, other: &AuthorityRank) -> bool {
        self > other
    }
}

impl Ord for AuthorityRank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            // Earlier seniority is the stronger claim, so the comparison
            // is inverted relative to the raw timestamps.
            .then_with(|| other.seniority.cmp(&self.seniority))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for AuthorityRank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The currently-finalized Anchor, process-wide singleton
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnchorState {
    /// Identifier of the finalized Anchor
    pub id: NodeId,
    /// The authority tuple that justified the promotion
    pub rank: AuthorityRank,
    /// When the promotion was finalized
    pub finalized_at: Timestamp,
}

impl AnchorState {
    pub fn new(rank: AuthorityRank, finalized_at: Timestamp) -> Self {
        AnchorState {
            id: rank.id,
            rank,
            finalized_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rank(score: u16, seniority_us: u64, id: u64) -> AuthorityRank {
        AuthorityRank::new(score, Timestamp::from_micros(seniority_us), NodeId::new(id))
    }

    #[test]
    fn test_higher_score_wins() {
        let strong = rank(90, 500, 1);
        let weak = rank(70, 100, 2);
        assert!(strong.outranks(&weak));
    }

    #[test]
    fn test_score_tie_falls_to_earlier_seniority() {
        let older = rank(70, 100, 9);
        let younger = rank(70, 200, 1);
        assert!(older.outranks(&younger));
    }

    #[test]
    fn test_exact_tie_settled_by_identifier() {
        let a = rank(70, 100, 1);
        let b = rank(70, 100, 2);
        assert!(b.outranks(&a));
        assert_eq!(a.cmp(&a), std::cmp::Ordering::Equal);
    }

    #[test]
    fn test_max_selects_the_winner() {
        let candidates = vec![rank(50, 10, 3), rank(90, 999, 1), rank(90, 998, 2)];
        let winner = candidates.iter().max().unwrap();
        assert_eq!(winner.id, NodeId::new(2));
    }

    proptest! {
        // The same candidate set must elect the same maximum no matter
        // what order the candidates were learned in.
        #[test]
        fn prop_max_is_order_independent(
            mut tuples in proptest::collection::vec((0u16..200, 0u64..10_000, 1u64..1_000), 1..32)
        ) {
            tuples.sort_unstable();
            tuples.dedup();
            let ranks: Vec<AuthorityRank> =
                tuples.iter().map(|&(s, t, i)| rank(s, t, i)).collect();
            let forward = ranks.iter().max().copied();

            let mut reversed = ranks.clone();
            reversed.reverse();
            let backward = reversed.iter().max().copied();

            prop_assert_eq!(forward, backward);
        }
    }
}
