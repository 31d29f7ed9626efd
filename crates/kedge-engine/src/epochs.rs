//! Epoch secret custody
//!
//! One manager per node wraps the [`EpochKeyring`] with the role policy:
//! the Anchor mints and rotates secrets on a fixed period, everyone else
//! adopts whatever the Anchor delivers. Minted generations always continue
//! upward from the highest generation ever seen, so a freshly promoted
//! Anchor supersedes its predecessor's secret instead of colliding with it.

use std::time::Duration;

use kedge_core::Timestamp;
use kedge_crypto::{EpochKeyring, EpochSecret, TAG_SIZE};

#[derive(Debug)]
pub struct EpochKeyManager {
    keyring: EpochKeyring,
    rotation_period: Duration,
    secret_lifetime: Duration,
    is_authority: bool,
    rotated_at: Option<Timestamp>,
}

impl EpochKeyManager {
    pub fn new(rotation_period: Duration, grace: Duration) -> Self {
        EpochKeyManager {
            keyring: EpochKeyring::new(grace),
            rotation_period,
            // A secret stays nominally valid through its successor's grace.
            secret_lifetime: rotation_period + grace,
            is_authority: false,
            rotated_at: None,
        }
    }

    /// Is this node currently minting epoch secrets?
    #[inline]
    pub fn is_authority(&self) -> bool {
        self.is_authority
    }

    /// Holds at least one epoch secret, current or previous.
    #[inline]
    pub fn synced(&self) -> bool {
        self.keyring.has_any()
    }

    /// The secret used for tagging outbound announcements.
    #[inline]
    pub fn current(&self) -> Option<&EpochSecret> {
        self.keyring.current()
    }

    /// Generation of the tagging secret, 0 before first sync.
    ///
    /// Not necessarily the highest ever held: a node that minted during
    /// a partition and then re-adopted the surviving Anchor's secret
    /// reports the re-adopted generation.
    #[inline]
    pub fn generation(&self) -> u32 {
        self.keyring.current().map_or(0, |s| s.generation)
    }

    /// Take over secret minting after a local promotion.
    ///
    /// Mints immediately so the new Anchor can tag its next pulse and
    /// serve epoch requests without waiting out a rotation period.
    pub fn assume_authority(&mut self, now: Timestamp) -> &EpochSecret {
        self.is_authority = true;
        self.rotated_at = Some(now);
        let secret = self.keyring.rotate_fresh(now, self.secret_lifetime);
        tracing::info!("assumed epoch authority, minted generation {}", secret.generation);
        secret
    }

    /// Stop minting after losing the Anchor role.
    ///
    /// Held secrets are kept: the node keeps tagging and verifying under
    /// them until the next Anchor distributes a replacement.
    pub fn resign(&mut self) {
        if self.is_authority {
            tracing::info!("resigned epoch authority at generation {}", self.generation());
        }
        self.is_authority = false;
        self.rotated_at = None;
    }

    /// Rotate if this node is the authority and the period has elapsed.
    pub fn rotate_if_due(&mut self, now: Timestamp) -> Option<&EpochSecret> {
        if !self.is_authority {
            return None;
        }
        let due = match self.rotated_at {
            Some(at) => now.since(at) >= self.rotation_period,
            None => true,
        };
        if !due {
            return None;
        }
        self.rotated_at = Some(now);
        Some(self.keyring.rotate_fresh(now, self.secret_lifetime))
    }

    /// Install a secret delivered by the Anchor.
    pub fn adopt(&mut self, secret: EpochSecret, now: Timestamp) {
        self.keyring.adopt(secret, now);
    }

    /// Verify an announcement tag against the held secrets.
    #[inline]
    pub fn verify(
        &self,
        generation: u32,
        message: &[u8],
        tag: &[u8; TAG_SIZE],
        now: Timestamp,
    ) -> bool {
        self.keyring.verify(generation, message, tag, now)
    }
}
