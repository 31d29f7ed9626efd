//! End-to-end protocol scenarios
//!
//! Whole-mesh runs covering bootstrap, election, failover, resync, and
//! partition healing on the simulated cluster, plus a few hand-driven
//! engine exchanges where the interesting part is a single datagram.

use kedge_core::{Persona, Timestamp};

use crate::cluster::Cluster;

/// One hub and two relays, the standard zone layout for scenarios.
pub fn standard_trio(start: Timestamp) -> (Cluster, usize, usize, usize) {
    let mut cluster = Cluster::new(start);
    let hub = cluster.add_node(Persona::Hub, 100);
    let relay_a = cluster.add_node(Persona::Relay, 70);
    let relay_b = cluster.add_node(Persona::Relay, 60);
    (cluster, hub, relay_a, relay_b)
}
