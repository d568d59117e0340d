//! USB/IP protocol version management
//!
//! The wire carries the version as a BCD-style `u16` (`0x0111` is 1.1.1).
//! Peers must agree on the exact version; there is no negotiation.

use std::fmt;

/// Protocol version decoded from the op-common header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

/// Version spoken by this implementation (USB/IP 1.1.1)
pub const CURRENT_VERSION: ProtocolVersion = ProtocolVersion {
    major: 1,
    minor: 1,
    patch: 1,
};

impl ProtocolVersion {
    /// Decode from the on-wire representation
    pub fn from_wire(value: u16) -> Self {
        Self {
            major: ((value >> 8) & 0xff) as u8,
            minor: ((value >> 4) & 0x0f) as u8,
            patch: (value & 0x0f) as u8,
        }
    }

    /// Encode to the on-wire representation
    pub fn to_wire(self) -> u16 {
        ((self.major as u16) << 8) | (((self.minor & 0x0f) as u16) << 4) | (self.patch & 0x0f) as u16
    }

    /// USB/IP requires both ends to run the exact same version
    pub fn is_compatible_with(&self, other: &ProtocolVersion) -> bool {
        self == other
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
