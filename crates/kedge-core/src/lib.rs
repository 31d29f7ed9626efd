//! KEDGE Core - Fundamental types and primitives
//!
//! This crate defines the core types used throughout the KEDGE protocol:
//! - Identifiers (NodeId, ZoneId)
//! - Time primitives (Timestamp)
//! - Node classification (Persona, NodeStatus)
//! - Authority ordering and anchor state
//! - Peer records, mesh events, configuration and errors

pub mod authority;
pub mod class;
pub mod config;
pub mod error;
pub mod event;
pub mod id;
pub mod peer;
pub mod time;

pub use authority::*;
pub use class::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use id::*;
pub use peer::*;
pub use time::*;
