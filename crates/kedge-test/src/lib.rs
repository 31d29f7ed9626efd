//! KEDGE Test Harness - Mesh simulation and protocol validation
//!
//! This crate provides:
//! - A deterministic multi-node cluster simulator
//! - Partition and failover scenario tooling
//! - The end-to-end protocol scenario suite

pub mod cluster;
pub mod scenarios;

pub use cluster::*;
pub use scenarios::*;
