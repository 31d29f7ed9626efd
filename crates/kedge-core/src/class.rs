//! Node classification for the KEDGE mesh
//!
//! Every node carries a persona - a closed set of deployment roles with
//! explicit capability rules. Persona determines anchor eligibility and
//! default provisioning; it is never inspected as a free-form string.

/// Deployment role of a node
///
/// Anchor eligibility is a capability of the persona, not a runtime
/// property: an `Observer` never becomes the Anchor no matter what
/// authority score it announces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Persona {
    /// Fixed installation with stable power and connectivity
    Hub = 0x00,

    /// Mid-tier node that keeps the mesh connected
    Relay = 0x01,

    /// Mobile node that drifts between sites
    #[default]
    Courier = 0x02,

    /// Passive listener: consumes coordination state, never anchors
    Observer = 0x03,
}

impl Persona {
    /// Parse from wire byte
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Persona::Hub),
            0x01 => Some(Persona::Relay),
            0x02 => Some(Persona::Courier),
            0x03 => Some(Persona::Observer),
            _ => None,
        }
    }

    /// Convert to wire byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// May this persona hold the Anchor role?
    pub fn anchor_eligible(self) -> bool {
        match self {
            Persona::Hub => true,
            Persona::Relay => true,
            Persona::Courier => true,
            Persona::Observer => false,
        }
    }

    /// Authority score assigned at provisioning when none is configured
    pub fn default_authority_score(self) -> u16 {
        match self {
            Persona::Hub => 100,
            Persona::Relay => 70,
            Persona::Courier => 50,
            Persona::Observer => 0,
        }
    }

    /// Human-readable role label for operator surfaces
    pub fn label(self) -> &'static str {
        match self {
            Persona::Hub => "hub",
            Persona::Relay => "relay",
            Persona::Courier => "courier",
            Persona::Observer => "observer",
        }
    }
}

/// Self-reported node health carried in announcements
///
/// Plays no role in election; surfaced to observers so operators can see
/// which nodes are running hot before they disappear.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum NodeStatus {
    /// Operating normally
    #[default]
    Ready = 0x00,

    /// Degraded but alive (load, battery, thermal)
    Stressed = 0x01,
}

impl NodeStatus {
    /// Parse from wire byte
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(NodeStatus::Ready),
            0x01 => Some(NodeStatus::Stressed),
            _ => None,
        }
    }

    /// Convert to wire byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    pub fn is_degraded(self) -> bool {
        matches!(self, NodeStatus::Stressed)
    }
}
