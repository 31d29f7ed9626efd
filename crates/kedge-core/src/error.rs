//! Error types for the KEDGE protocol

use thiserror::Error;

/// Core KEDGE errors
#[derive(Error, Debug)]
pub enum KedgeError {
    // Wire errors
    #[error("Invalid wire format: {0}")]
    InvalidWireFormat(String),

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Unsupported wire version: {0}")]
    UnsupportedVersion(u8),

    #[error("Unknown message kind: {0:#04x}")]
    UnknownMessageKind(u8),

    #[error("Unknown flag bits: {0:#04x}")]
    UnknownFlags(u8),

    #[error("Unknown persona: {0:#04x}")]
    UnknownPersona(u8),

    #[error("Unknown node status: {0:#04x}")]
    UnknownStatus(u8),

    // Crypto errors
    #[error("Invalid key material")]
    InvalidKeyMaterial,

    #[error("Sealed payload could not be opened")]
    SealOpenFailed,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Transport errors
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Result type for KEDGE operations
pub type KedgeResult<T> = Result<T, KedgeError>;
