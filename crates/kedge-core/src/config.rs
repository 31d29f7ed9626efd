//! Mesh configuration
//!
//! All timing rules in the engine read from this one struct; defaults
//! follow the reference deployment cadence (5 s pulses, 3 missed pulses
//! to declare loss, 5 s promotion hysteresis, 60 s epoch rotation).

use std::net::Ipv6Addr;
use std::time::Duration;

use crate::{KedgeError, KedgeResult, Persona};

/// Well-known link-local coordination group
pub const DEFAULT_MULTICAST_GROUP: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0x1);

/// Well-known coordination port
pub const DEFAULT_PORT: u16 = 19541;

/// Default zone name, hashed into the on-wire `ZoneId`
pub const DEFAULT_ZONE: &str = "kedge";

/// Runtime configuration for one mesh node
#[derive(Clone, Debug)]
pub struct MeshConfig {
    /// Zone name; only traffic from the same zone is processed
    pub zone: String,
    /// Deployment role of this node
    pub persona: Persona,
    /// Fixed authority score assigned at provisioning
    pub authority_score: u16,
    /// Link-local multicast group for pulses
    pub multicast_group: Ipv6Addr,
    /// UDP port for pulses and epoch exchange
    pub port: u16,
    /// Interface index for the multicast join (0 = system default)
    pub interface: u32,
    /// Cadence of outbound announcements
    pub pulse_interval: Duration,
    /// Consecutive missed pulses before the Anchor is declared lost
    pub missed_interval_threshold: u32,
    /// How long a candidate must hold top authority before promotion
    pub hysteresis_window: Duration,
    /// Anchor-side epoch secret rotation period
    pub epoch_rotation_period: Duration,
    /// How long the previous epoch secret stays acceptable after rotation
    pub epoch_grace_period: Duration,
    /// Eviction window for peers with no valid announcement
    pub peer_expiry_timeout: Duration,
    /// Consecutive integrity failures before a peer is marked mistrusted
    pub integrity_failure_threshold: u32,
    /// Minimum spacing between answered epoch requests per identifier
    pub req_epoch_rate_limit: Duration,
    /// How long to wait for an epoch response before retrying
    pub req_epoch_timeout: Duration,
    /// Upper bound for the requester-side retry backoff
    pub resync_backoff_cap: Duration,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        MeshConfig {
            zone: DEFAULT_ZONE.to_string(),
            persona: Persona::default(),
            authority_score: Persona::default().default_authority_score(),
            multicast_group: DEFAULT_MULTICAST_GROUP,
            port: DEFAULT_PORT,
            interface: 0,
            pulse_interval: Duration::from_secs(5),
            missed_interval_threshold: 3,
            hysteresis_window: Duration::from_secs(5),
            epoch_rotation_period: Duration::from_secs(60),
            epoch_grace_period: Duration::from_secs(10),
            peer_expiry_timeout: Duration::from_secs(15),
            integrity_failure_threshold: 3,
            req_epoch_rate_limit: Duration::from_secs(2),
            req_epoch_timeout: Duration::from_secs(2),
            resync_backoff_cap: Duration::from_secs(30),
            event_capacity: 64,
        }
    }
}

impl MeshConfig {
    /// Config provisioned for a given persona with its default score.
    pub fn for_persona(persona: Persona) -> Self {
        MeshConfig {
            persona,
            authority_score: persona.default_authority_score(),
            ..MeshConfig::default()
        }
    }

    /// Silence budget before the Anchor is considered lost.
    #[inline]
    pub fn anchor_silence_limit(&self) -> Duration {
        self.pulse_interval * self.missed_interval_threshold
    }

    /// Sanity-check the timing relations the engine depends on.
    pub fn validate(&self) -> KedgeResult<()> {
        if self.pulse_interval.is_zero() {
            return Err(KedgeError::InvalidConfig(
                "pulse_interval must be non-zero".into(),
            ));
        }
        if self.missed_interval_threshold == 0 {
            return Err(KedgeError::InvalidConfig(
                "missed_interval_threshold must be at least 1".into(),
            ));
        }
        if self.integrity_failure_threshold == 0 {
            return Err(KedgeError::InvalidConfig(
                "integrity_failure_threshold must be at least 1".into(),
            ));
        }
        if self.peer_expiry_timeout < self.pulse_interval {
            return Err(KedgeError::InvalidConfig(
                "peer_expiry_timeout must cover at least one pulse interval".into(),
            ));
        }
        if self.zone.is_empty() {
            return Err(KedgeError::InvalidConfig("zone must not be empty".into()));
        }
        Ok(())
    }
}
