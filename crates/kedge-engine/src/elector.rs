//! Anchor election - deterministic authority comparison with hysteresis
//!
//! Every node runs the same pure computation over its own view: the
//! maximum [`AuthorityRank`] among live candidates wins. No ballots are
//! exchanged; convergence follows from the views converging. Promotion
//! is damped by a hysteresis window so a transiently inconsistent view
//! cannot flap the anchor.

use std::time::Duration;

use kedge_core::{AnchorState, AuthorityRank, MeshEvent, NodeId, Timestamp};

/// A candidate holding top authority, waiting out the hysteresis window
#[derive(Clone, Copy, Debug)]
struct PendingCandidate {
    rank: AuthorityRank,
    since: Timestamp,
}

/// Single owner of [`AnchorState`]
#[derive(Debug)]
pub struct AnchorElector {
    hysteresis: Duration,
    pending: Option<PendingCandidate>,
    anchor: Option<AnchorState>,
}

impl AnchorElector {
    pub fn new(hysteresis: Duration) -> Self {
        AnchorElector {
            hysteresis,
            pending: None,
            anchor: None,
        }
    }

    /// The currently finalized anchor, if any.
    pub fn anchor(&self) -> Option<&AnchorState> {
        self.anchor.as_ref()
    }

    /// Whether `id` is the finalized anchor.
    pub fn is_anchor(&self, id: NodeId) -> bool {
        self.anchor.as_ref().is_some_and(|a| a.id == id)
    }

    /// Re-evaluate the election over the current candidate set.
    ///
    /// Returns at most one anchor transition. A challenger outranking a
    /// live anchor replaces it only after holding top authority for the
    /// full window; an anchor that dropped out of the candidate set is
    /// cleared immediately while re-election continues under hysteresis.
    pub fn evaluate(
        &mut self,
        candidates: &[AuthorityRank],
        now: Timestamp,
    ) -> Option<MeshEvent> {
        let best = candidates.iter().max().copied();

        let Some(best) = best else {
            self.pending = None;
            return self.clear_anchor();
        };

        if let Some(anchor) = &mut self.anchor {
            if anchor.id == best.id {
                // Stable: keep the justification current, drop any challenger.
                anchor.rank = best;
                self.pending = None;
                return None;
            }
        }

        let matured = match &self.pending {
            Some(pending) if pending.rank.id == best.id => {
                now.since(pending.since) >= self.hysteresis
            }
            _ => {
                self.pending = Some(PendingCandidate {
                    rank: best,
                    since: now,
                });
                false
            }
        };

        if matured {
            let previous = self.anchor.as_ref().map(|a| a.id);
            self.anchor = Some(AnchorState::new(best, now));
            self.pending = None;
            tracing::debug!("anchor finalized: {}", best.id);
            return Some(MeshEvent::AnchorChanged {
                previous,
                current: Some(best.id),
            });
        }

        // A still-live anchor keeps the role while the challenger waits;
        // one that is no longer a candidate cannot.
        let anchor_still_candidate = self
            .anchor
            .as_ref()
            .is_some_and(|a| candidates.iter().any(|c| c.id == a.id));
        if !anchor_still_candidate {
            return self.clear_anchor();
        }
        None
    }

    fn clear_anchor(&mut self) -> Option<MeshEvent> {
        let previous = self.anchor.take()?.id;
        tracing::debug!("anchor lost: {}", previous);
        Some(MeshEvent::AnchorChanged {
            previous: Some(previous),
            current: None,
        })
    }
}
