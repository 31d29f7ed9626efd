//! Deterministic multi-node mesh simulator
//!
//! Runs several coordination engines against one synthetic clock and a
//! lossless in-memory network. Frames queued during a step are delivered
//! before time advances, so a request issued in one second is answered
//! within that same second, as the real runtime's sub-second
//! housekeeping would. Identities are derived from the node index, which
//! keeps rank tie-breaks reproducible across runs.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use kedge_core::{MeshConfig, MeshEvent, NodeId, Persona, Timestamp};
use kedge_crypto::Identity;
use kedge_engine::{CoordinationEngine, EngineStats, MeshSnapshot, Outbound};

/// Zone name shared by every simulated node
pub const SIM_ZONE: &str = "kedge-sim";

/// Upper bound on request/response chains settled within one step
const DELIVERY_ROUNDS: usize = 8;

/// One engine and its simulated link endpoint
pub struct SimNode {
    engine: CoordinationEngine,
    addr: SocketAddr,
    online: bool,
    /// Every event the engine emitted, in order
    pub events: Vec<MeshEvent>,
}

impl SimNode {
    pub fn id(&self) -> NodeId {
        self.engine.local_id()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn is_anchor(&self) -> bool {
        self.engine.is_anchor()
    }

    pub fn anchor(&self) -> Option<NodeId> {
        self.engine.anchor()
    }

    pub fn snapshot(&self) -> MeshSnapshot {
        self.engine.snapshot()
    }

    pub fn stats(&self) -> EngineStats {
        *self.engine.stats()
    }

    /// Anchor transitions this node observed, in order.
    pub fn anchor_events(&self) -> Vec<MeshEvent> {
        self.events
            .iter()
            .filter(|e| matches!(e, MeshEvent::AnchorChanged { .. }))
            .copied()
            .collect()
    }
}

/// In-memory mesh of simulated nodes
pub struct Cluster {
    nodes: Vec<SimNode>,
    started: Timestamp,
    now: Timestamp,
    pulse_interval: Duration,
    /// Severed directed links, kept symmetric by cut and heal
    cuts: HashSet<(usize, usize)>,
    /// Frames that had no reachable destination
    pub dropped_frames: u64,
}

impl Cluster {
    pub fn new(start: Timestamp) -> Self {
        Cluster {
            nodes: Vec::new(),
            started: start,
            now: start,
            pulse_interval: MeshConfig::default().pulse_interval,
            cuts: HashSet::new(),
            dropped_frames: 0,
        }
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> &SimNode {
        &self.nodes[index]
    }

    /// Add a node that activates at the current simulated time.
    pub fn add_node(&mut self, persona: Persona, authority_score: u16) -> usize {
        let index = self.nodes.len();
        let config = MeshConfig {
            zone: SIM_ZONE.to_string(),
            persona,
            authority_score,
            ..MeshConfig::default()
        };

        let mut seed = [0u8; 32];
        seed[0] = (index + 1) as u8;
        seed[1] = 0x5E;
        let identity = Identity::from_bytes(&seed);

        let engine = CoordinationEngine::new(config, identity, self.now)
            .expect("simulator config is valid");
        let addr: SocketAddr = format!("[fe80::{:x}]:19541", index + 1)
            .parse()
            .expect("simulator address is valid");

        self.nodes.push(SimNode {
            engine,
            addr,
            online: true,
            events: Vec::new(),
        });
        index
    }

    /// Take a node off the network. Offline nodes neither emit nor
    /// receive; their engine state is frozen as-is.
    pub fn set_online(&mut self, index: usize, online: bool) {
        self.nodes[index].online = online;
    }

    /// Sever the link between two nodes in both directions.
    pub fn cut(&mut self, a: usize, b: usize) {
        self.cuts.insert((a, b));
        self.cuts.insert((b, a));
    }

    /// Restore a severed link.
    pub fn heal(&mut self, a: usize, b: usize) {
        self.cuts.remove(&(a, b));
        self.cuts.remove(&(b, a));
    }

    fn linked(&self, from: usize, to: usize) -> bool {
        !self.cuts.contains(&(from, to))
    }

    /// Run whole seconds of simulated time.
    pub fn run_for(&mut self, duration: Duration) {
        for _ in 0..duration.as_secs() {
            self.step_second();
        }
    }

    /// One simulated second: pulses on the shared cadence, then
    /// housekeeping and rotation for every node, with delivery after
    /// each phase.
    fn step_second(&mut self) {
        let elapsed = self.now.since(self.started).as_secs();
        if elapsed % self.pulse_interval.as_secs() == 0 {
            for node in &mut self.nodes {
                if node.online {
                    node.engine.pulse();
                }
            }
        }
        self.deliver();

        for i in 0..self.nodes.len() {
            if self.nodes[i].online {
                let now = self.now;
                self.nodes[i].engine.tick(now);
                self.nodes[i].engine.rotate_epoch(now);
            }
        }
        self.deliver();

        self.collect_events();
        self.now = self.now + Duration::from_secs(1);
    }

    fn deliver(&mut self) {
        for _ in 0..DELIVERY_ROUNDS {
            let mut moved = false;
            for from in 0..self.nodes.len() {
                let frames: Vec<Outbound> =
                    std::iter::from_fn(|| self.nodes[from].engine.pop_outbound()).collect();
                if frames.is_empty() {
                    continue;
                }
                if !self.nodes[from].online {
                    self.dropped_frames += frames.len() as u64;
                    continue;
                }
                moved = true;
                let src = self.nodes[from].addr;
                for frame in frames {
                    match frame {
                        Outbound::Broadcast(bytes) => {
                            for to in 0..self.nodes.len() {
                                if to != from && self.nodes[to].online && self.linked(from, to) {
                                    let now = self.now;
                                    self.nodes[to].engine.ingest(&bytes, src, now);
                                }
                            }
                        }
                        Outbound::Unicast(bytes, dest) => match self.index_by_addr(dest) {
                            Some(to) if self.nodes[to].online && self.linked(from, to) => {
                                let now = self.now;
                                self.nodes[to].engine.ingest(&bytes, src, now);
                            }
                            _ => self.dropped_frames += 1,
                        },
                    }
                }
            }
            if !moved {
                break;
            }
        }
    }

    fn index_by_addr(&self, addr: SocketAddr) -> Option<usize> {
        self.nodes.iter().position(|n| n.addr == addr)
    }

    fn collect_events(&mut self) {
        for node in &mut self.nodes {
            while let Some(event) = node.engine.pop_event() {
                node.events.push(event);
            }
        }
    }

    /// The anchor every online node agrees on, if they all agree.
    pub fn agreed_anchor(&self) -> Option<NodeId> {
        let mut agreed = None;
        for node in self.nodes.iter().filter(|n| n.online) {
            let anchor = node.engine.anchor()?;
            match agreed {
                None => agreed = Some(anchor),
                Some(existing) if existing == anchor => {}
                Some(_) => return None,
            }
        }
        agreed
    }

    /// Number of online nodes that consider themselves the Anchor.
    pub fn anchor_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.online && n.engine.is_anchor())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_nodes_converge_on_the_hub() {
        let mut cluster = Cluster::new(Timestamp::from_secs(100));
        let hub = cluster.add_node(Persona::Hub, 100);
        let relay = cluster.add_node(Persona::Relay, 70);

        cluster.run_for(Duration::from_secs(7));

        assert_eq!(cluster.agreed_anchor(), Some(cluster.node(hub).id()));
        assert_eq!(cluster.anchor_count(), 1);
        assert!(cluster.node(hub).snapshot().synced);
        assert!(cluster.node(relay).snapshot().synced);
    }

    #[test]
    fn test_cut_isolates_nodes_completely() {
        let mut cluster = Cluster::new(Timestamp::from_secs(100));
        let a = cluster.add_node(Persona::Relay, 70);
        let b = cluster.add_node(Persona::Relay, 60);
        cluster.cut(a, b);

        cluster.run_for(Duration::from_secs(7));

        // Neither ever heard the other: each elects itself.
        assert!(cluster.node(a).snapshot().peers.is_empty());
        assert!(cluster.node(b).snapshot().peers.is_empty());
        assert_eq!(cluster.anchor_count(), 2);
        assert_eq!(cluster.agreed_anchor(), None);
    }

    #[test]
    fn test_node_indices_give_stable_identities() {
        let mut first = Cluster::new(Timestamp::from_secs(100));
        let mut second = Cluster::new(Timestamp::from_secs(100));
        let a1 = first.add_node(Persona::Hub, 100);
        let a2 = second.add_node(Persona::Hub, 100);

        assert_eq!(first.node(a1).id(), second.node(a2).id());
    }
}
