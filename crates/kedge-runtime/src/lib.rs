//! KEDGE Runtime - Async node runtime
//!
//! This crate turns the sans-IO coordination engine into a running
//! node:
//! - [`MeshNode`] with pulse, receive, housekeeping, and rotation tasks
//! - Broadcast channel for mesh events
//! - Structured logging setup

pub mod node;
pub mod telemetry;

pub use node::*;
pub use telemetry::*;
