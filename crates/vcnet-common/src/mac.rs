//! Hardware (MAC) address generation and validation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{VcError, VcResult};

/// A 48-bit Ethernet hardware address.
///
/// Addresses render as lowercase, colon separated octets
/// (`02:42:ac:11:00:02`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HardwareAddr([u8; 6]);

impl HardwareAddr {
    /// Create an address from raw octets.
    #[must_use]
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Generate a random, locally administered, unicast address.
    ///
    /// The octets come from a UUID v4, with the locally-administered bit set
    /// and the multicast bit cleared.
    #[must_use]
    pub fn generate_private() -> Self {
        let uuid = uuid::Uuid::new_v4();
        let mut octets = [0u8; 6];
        octets.copy_from_slice(&uuid.as_bytes()[..6]);
        octets[0] = (octets[0] | 0x02) & 0xfe;
        Self(octets)
    }

    /// Raw octets.
    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Whether the locally-administered bit is set.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        self.0[0] & 0x02 != 0
    }

    /// Whether the multicast bit is set.
    #[must_use]
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for HardwareAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for HardwareAddr {
    type Err = VcError;

    fn from_str(s: &str) -> VcResult<Self> {
        let invalid = || VcError::InvalidInput {
            message: format!("invalid hardware address: {s}"),
        };

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(invalid());
        }

        let mut octets = [0u8; 6];
        for (octet, part) in octets.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(invalid());
            }
            let bytes = hex::decode(part).map_err(|_| invalid())?;
            *octet = bytes[0];
        }

        Ok(Self(octets))
    }
}

impl TryFrom<String> for HardwareAddr {
    type Error = VcError;

    fn try_from(value: String) -> VcResult<Self> {
        value.parse()
    }
}

impl From<HardwareAddr> for String {
    fn from(addr: HardwareAddr) -> Self {
        addr.to_string()
    }
}
