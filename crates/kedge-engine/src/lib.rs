//! KEDGE Engine - Anchor election, peer tracking, and epoch key management
//!
//! This crate implements the coordination core of the KEDGE protocol:
//! - Peer table with trust tracking and silence-based eviction
//! - Deterministic anchor election with hysteresis
//! - Epoch secret custody, rotation, and adoption
//! - Admission gate for incoming announcements
//! - Rate limiting and resync throttling
//! - The sans-IO [`CoordinationEngine`] tying it all together

pub mod elector;
pub mod engine;
pub mod epochs;
pub mod gate;
pub mod limit;
pub mod table;

pub use elector::*;
pub use engine::*;
pub use epochs::*;
pub use gate::*;
pub use limit::*;
pub use table::*;
