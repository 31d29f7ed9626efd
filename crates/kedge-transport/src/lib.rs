//! KEDGE Transport Layer - Link-local IPv6 multicast
//!
//! This crate provides:
//! - One UDP socket per node, joined to the zone's multicast group
//! - Zone-wide broadcast and per-peer unicast over the same socket
//! - A background receive loop that survives transient socket errors

pub mod multicast;

pub use multicast::*;
