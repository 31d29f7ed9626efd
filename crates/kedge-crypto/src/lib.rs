//! KEDGE Crypto - Cryptographic primitives for mesh coordination
//!
//! Provides the three authentication layers of the KEDGE protocol:
//! - Identity management (Ed25519) and hash-derived identifiers
//! - Keyed integrity tags over announcements (HMAC-SHA256)
//! - Epoch secret lifecycle and sealed delivery
//!   (X25519 + HKDF-SHA256 + ChaCha20-Poly1305)

pub mod epoch;
pub mod identity;
pub mod seal;
pub mod tag;

pub use epoch::*;
pub use identity::*;
pub use seal::*;
pub use tag::*;
