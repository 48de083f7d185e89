//! Address codec: canonical integer form, display form, and CIDR containment.
//!
//! IPv4 addresses map to `0..=u32::MAX`, IPv6 addresses to their full 128-bit
//! value. All comparisons and containment tests happen on the integer form;
//! strings are presentation only.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::IpNet;

use crate::error::{CoreError, Result};

/// Order-preserving integer encoding of an IP address.
pub type Canonical = u128;

/// Address family of a parsed address or range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub fn bits(self) -> u8 {
        match self {
            Self::V4 => 32,
            Self::V6 => 128,
        }
    }

    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }
}

/// Parse a human-readable address. Surrounding whitespace is not tolerated.
pub fn parse(address: &str) -> Result<IpAddr> {
    address
        .parse::<IpAddr>()
        .map_err(|_| CoreError::InvalidAddress(address.to_string()))
}

/// Convert an address string to its canonical integer form.
pub fn to_canonical(address: &str) -> Result<Canonical> {
    parse(address).map(|ip| canonical_of(&ip))
}

/// Canonical integer form of an already-parsed address.
pub fn canonical_of(ip: &IpAddr) -> Canonical {
    match ip {
        IpAddr::V4(v4) => u32::from(*v4) as u128,
        IpAddr::V6(v6) => u128::from(*v6),
    }
}

/// Convert a canonical integer back to its display form.
///
/// Values that fit in 32 bits are rendered as IPv4, so an IPv4-compatible
/// IPv6 address (`::a00:5`) displays as `10.0.0.5`. Use [`to_ip_in`] when
/// the owning subnet's family is known.
pub fn to_display(canonical: Canonical) -> String {
    to_ip(canonical).to_string()
}

/// Address for a canonical value, using the same IPv4 rule as [`to_display`].
pub fn to_ip(canonical: Canonical) -> IpAddr {
    match u32::try_from(canonical) {
        Ok(v4) => IpAddr::V4(Ipv4Addr::from(v4)),
        Err(_) => IpAddr::V6(Ipv6Addr::from(canonical)),
    }
}

/// Address for a canonical value interpreted in a known family.
pub fn to_ip_in(canonical: Canonical, family: Family) -> IpAddr {
    match (family, u32::try_from(canonical)) {
        (Family::V4, Ok(v4)) => IpAddr::V4(Ipv4Addr::from(v4)),
        _ => IpAddr::V6(Ipv6Addr::from(canonical)),
    }
}

/// Inclusive canonical range `[network, network + 2^(bits - mask) - 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostRange {
    family: Family,
    start: Canonical,
    end: Canonical,
}

impl HostRange {
    pub fn new(network: &IpAddr, mask: u8) -> Result<Self> {
        let family = Family::of(network);
        let bits = family.bits();
        if mask > bits {
            return Err(CoreError::InvalidAddress(format!("{network}/{mask}")));
        }

        let host_bits = u32::from(bits - mask);
        let span = if host_bits >= 128 {
            u128::MAX
        } else {
            (1u128 << host_bits) - 1
        };
        let family_max = match family {
            Family::V4 => u32::MAX as u128,
            Family::V6 => u128::MAX,
        };

        let start = canonical_of(network);
        let end = start.saturating_add(span).min(family_max);

        Ok(Self { family, start, end })
    }

    /// Parse `network` and build its range.
    pub fn parse(network: &str, mask: u8) -> Result<Self> {
        Self::new(&parse(network)?, mask)
    }

    pub fn end(&self) -> Canonical {
        self.end
    }

    /// Whether a single host (implicit host mask) falls inside this range.
    /// Addresses of the other family are never contained.
    pub fn contains(&self, candidate: &IpAddr) -> bool {
        if Family::of(candidate) != self.family {
            return false;
        }
        let value = canonical_of(candidate);
        value >= self.start && value <= self.end
    }
}

/// Test whether `candidate` falls within `network/mask`.
pub fn contains(candidate: &str, network: &str, mask: u8) -> Result<bool> {
    let range = HostRange::parse(network, mask)?;
    Ok(range.contains(&parse(candidate)?))
}

/// CIDR notation for display, e.g. `10.0.0.0/24`.
pub fn cidr(network: &IpAddr, mask: u8) -> String {
    match IpNet::new(*network, mask) {
        Ok(net) => net.to_string(),
        Err(_) => format!("{network}/{mask}"),
    }
}

/// Serde adapter storing a canonical address as its display string.
pub mod display_form {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Canonical;

    pub fn serialize<S: Serializer>(value: &Canonical, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_display(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Canonical, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::to_canonical(&raw).map_err(serde::de::Error::custom)
    }
}
