//! Mesh events pushed to external observers
//!
//! The coordination core never surfaces raw internal errors; collaborators
//! (dashboards, bridges) see only these state transitions.

use crate::{NodeId, Persona, TrustState};

/// A state transition worth telling collaborators about
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshEvent {
    /// First valid announcement from a previously unknown identifier
    PeerJoined { id: NodeId, persona: Persona },

    /// Peer evicted after the expiry window with no valid announcement
    PeerExpired { id: NodeId },

    /// Local trust classification of a peer changed
    PeerTrustChanged { id: NodeId, trust: TrustState },

    /// AnchorState changed: promotion (`current` set) or loss (`current`
    /// empty, re-election under way)
    AnchorChanged {
        previous: Option<NodeId>,
        current: Option<NodeId>,
    },
}

impl MeshEvent {
    /// The peer this event is about, if it concerns a single peer.
    pub fn subject(&self) -> Option<NodeId> {
        match self {
            MeshEvent::PeerJoined { id, .. } => Some(*id),
            MeshEvent::PeerExpired { id } => Some(*id),
            MeshEvent::PeerTrustChanged { id, .. } => Some(*id),
            MeshEvent::AnchorChanged { current, .. } => *current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_extraction() {
        let id = NodeId::new(42);
        assert_eq!(
            MeshEvent::PeerExpired { id }.subject(),
            Some(id)
        );
        assert_eq!(
            MeshEvent::AnchorChanged {
                previous: Some(id),
                current: None
            }
            .subject(),
            None
        );
    }
}
