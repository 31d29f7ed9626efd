//! Epoch secret lifecycle
//!
//! The anchor mints a fresh 32-byte secret each epoch and hands it out
//! through sealed unicast responses. Verifiers hold the current secret
//! plus the one it displaced, so tags that straddle a rotation keep
//! verifying for a short grace window.

use std::time::Duration;

use rand::rngs::OsRng;
use rand::RngCore;

use kedge_core::Timestamp;

use crate::tag::{verify_tag, TAG_SIZE};

/// Size of the shared epoch secret
pub const SECRET_SIZE: usize = 32;

/// One generation of the zone-wide integrity secret.
#[derive(Clone)]
pub struct EpochSecret {
    key: [u8; SECRET_SIZE],
    /// Generation counter, strictly increasing across rotations
    pub generation: u32,
    /// When the anchor minted this secret
    pub issued_at: Timestamp,
    /// Advisory end of validity; holders keep tagging with the current
    /// secret past this point rather than go silent during an interregnum
    pub expires_at: Timestamp,
}

impl EpochSecret {
    /// Mint a fresh random secret for `generation`.
    pub fn generate(generation: u32, issued_at: Timestamp, lifetime: Duration) -> Self {
        let mut key = [0u8; SECRET_SIZE];
        OsRng.fill_bytes(&mut key);
        Self {
            key,
            generation,
            issued_at,
            expires_at: issued_at + lifetime,
        }
    }

    /// Reconstruct a secret received from the anchor.
    pub fn from_parts(
        key: [u8; SECRET_SIZE],
        generation: u32,
        issued_at: Timestamp,
        expires_at: Timestamp,
    ) -> Self {
        Self {
            key,
            generation,
            issued_at,
            expires_at,
        }
    }

    /// Raw key material, for tagging and sealing.
    pub fn key(&self) -> &[u8; SECRET_SIZE] {
        &self.key
    }
}

impl std::fmt::Debug for EpochSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpochSecret")
            .field("generation", &self.generation)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Holds the current epoch secret and the previous one for grace handling.
#[derive(Debug)]
pub struct EpochKeyring {
    current: Option<EpochSecret>,
    /// Displaced secret and the instant it was retired
    previous: Option<(EpochSecret, Timestamp)>,
    grace: Duration,
}

impl EpochKeyring {
    pub fn new(grace: Duration) -> Self {
        Self {
            current: None,
            previous: None,
            grace,
        }
    }

    /// The secret used for outbound tags, if any is held.
    pub fn current(&self) -> Option<&EpochSecret> {
        self.current.as_ref()
    }

    /// Whether any secret is held. A node holding none is unsynced.
    pub fn has_any(&self) -> bool {
        self.current.is_some()
    }

    /// Highest generation ever held, 0 before the first secret arrives.
    pub fn highest_generation(&self) -> u32 {
        let current = self.current.as_ref().map_or(0, |s| s.generation);
        let previous = self.previous.as_ref().map_or(0, |(s, _)| s.generation);
        current.max(previous)
    }

    /// Mint a new secret one generation above anything held.
    ///
    /// Called by the anchor on promotion and on schedule thereafter. The
    /// displaced secret moves to the grace slot.
    pub fn rotate_fresh(&mut self, now: Timestamp, lifetime: Duration) -> &EpochSecret {
        let generation = self.highest_generation() + 1;
        let secret = EpochSecret::generate(generation, now, lifetime);
        if let Some(old) = self.current.take() {
            self.previous = Some((old, now));
        }
        tracing::debug!("minted epoch secret generation {}", generation);
        self.current.insert(secret)
    }

    /// Install a secret learned from the anchor.
    ///
    /// The anchor is authoritative: whatever it sends becomes current. A
    /// re-delivery of the generation already held just refreshes it.
    pub fn adopt(&mut self, secret: EpochSecret, now: Timestamp) {
        match self.current.take() {
            Some(old) if old.generation != secret.generation => {
                self.previous = Some((old, now));
            }
            _ => {}
        }
        tracing::debug!("adopted epoch secret generation {}", secret.generation);
        self.current = Some(secret);
    }

    /// Verify a tag under whichever held secret matches `generation`.
    ///
    /// The current secret verifies regardless of its advisory validity.
    /// The previous secret verifies only within the grace window after
    /// its retirement.
    pub fn verify(
        &self,
        generation: u32,
        message: &[u8],
        tag: &[u8; TAG_SIZE],
        now: Timestamp,
    ) -> bool {
        if let Some(current) = &self.current {
            if current.generation == generation {
                return verify_tag(current.key(), message, tag);
            }
        }
        if let Some((previous, retired_at)) = &self.previous {
            if previous.generation == generation && now.since(*retired_at) <= self.grace {
                return verify_tag(previous.key(), message, tag);
            }
        }
        false
    }
}
