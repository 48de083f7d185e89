//! Inventory domain types.
//!
//! Subnets, devices, and agents are configuration owned by the inventory
//! store and read fresh for every pass. Address records are the reconciled
//! state this system writes back.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::{self, Canonical, HostRange};
use crate::error::{CoreError, Result};

// ── Identifiers ───────────────────────────────────────────────────

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of a subnet in the inventory.
    SubnetId
);
id_type!(
    /// Identifier of a section grouping subnets.
    SectionId
);
id_type!(
    /// Identifier of a network device that can be queried.
    DeviceId
);
id_type!(
    /// Identifier of a persisted address record.
    AddressId
);
id_type!(
    /// Identity on whose behalf a pass runs.
    AgentId
);
id_type!(
    /// Identifier of a configured set of DNS nameservers.
    NameserverId
);

impl AgentId {
    /// The local agent, used when no agent identity is given.
    pub const LOCAL: AgentId = AgentId(1);
}

impl Default for AgentId {
    fn default() -> Self {
        Self::LOCAL
    }
}

// ── Subnets ───────────────────────────────────────────────────────

/// A subnet as configured in the inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subnet {
    pub id: SubnetId,
    pub section_id: SectionId,
    pub network: IpAddr,
    pub mask: u8,
    #[serde(default)]
    pub description: Option<String>,
    /// Parent subnet when this subnet is nested inside another.
    #[serde(default)]
    pub master_subnet_id: Option<SubnetId>,
    #[serde(default)]
    pub discovery_enabled: bool,
    #[serde(default)]
    pub resolve_dns: bool,
    #[serde(default)]
    pub scan_agent: AgentId,
    #[serde(default)]
    pub nameserver_id: Option<NameserverId>,
    #[serde(default)]
    pub last_discovery: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_scan: Option<DateTime<Utc>>,
}

impl Subnet {
    pub fn cidr(&self) -> String {
        address::cidr(&self.network, self.mask)
    }

    pub fn range(&self) -> Result<HostRange> {
        HostRange::new(&self.network, self.mask)
    }

    /// Description if set, otherwise the CIDR.
    pub fn label(&self) -> String {
        match &self.description {
            Some(d) if !d.is_empty() => d.clone(),
            _ => self.cidr(),
        }
    }
}

// ── Devices ───────────────────────────────────────────────────────

/// Table queries a device can answer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// IPv4 ARP table (`ipNetToMediaPhysAddress`).
    ArpTable,
    /// Version-independent neighbor table (`ipNetToPhysicalPhysAddress`).
    NeighborTable,
    /// Any query this system does not use (routing tables, VLANs, ...).
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum SnmpVersion {
    #[serde(rename = "1")]
    V1,
    #[default]
    #[serde(rename = "2c")]
    V2c,
}

impl SnmpVersion {
    pub fn as_arg(&self) -> &'static str {
        match self {
            Self::V1 => "1",
            Self::V2c => "2c",
        }
    }
}

/// A network device that reports its address-resolution tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub hostname: String,
    #[serde(default)]
    pub snmp_version: SnmpVersion,
    #[serde(default = "default_community")]
    pub snmp_community: String,
    #[serde(default)]
    pub queries: Vec<QueryKind>,
    /// Sections this device may be queried for.
    #[serde(default)]
    pub sections: Vec<SectionId>,
}

fn default_community() -> String {
    "public".to_string()
}

impl Device {
    pub fn supports(&self, kind: QueryKind) -> bool {
        self.queries.contains(&kind)
    }

    pub fn serves_section(&self, section: SectionId) -> bool {
        self.sections.contains(&section)
    }
}

// ── Agents ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
}

// ── Addresses ─────────────────────────────────────────────────────

/// Inventory status of an address. Discovery only writes Online/Offline.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AddressStatus {
    Online,
    #[default]
    Offline,
    Used,
    Dhcp,
    Reserved,
}

impl fmt::Display for AddressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Online => "Online",
            Self::Offline => "Offline",
            Self::Used => "Used",
            Self::Dhcp => "DHCP",
            Self::Reserved => "Reserved",
        };
        f.write_str(s)
    }
}

/// A persisted address record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressRecord {
    pub id: AddressId,
    pub subnet_id: SubnetId,
    #[serde(with = "address::display_form")]
    pub address: Canonical,
    #[serde(default)]
    pub mac: Option<MacAddress>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub status: AddressStatus,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

impl AddressRecord {
    pub fn display(&self) -> String {
        address::to_display(self.address)
    }

    pub fn has_hostname(&self) -> bool {
        self.hostname.as_deref().is_some_and(|h| !h.is_empty())
    }
}

/// An address record that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAddress {
    pub subnet_id: SubnetId,
    pub address: Canonical,
    pub mac: Option<MacAddress>,
    pub status: AddressStatus,
}

/// One row of a device's address-resolution table, as reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredEntry {
    pub address: String,
    pub mac: String,
}

impl DiscoveredEntry {
    pub fn new(address: impl Into<String>, mac: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            mac: mac.into(),
        }
    }
}

// ── Physical addresses ────────────────────────────────────────────

/// A 6-octet hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(eui48::MacAddress);

impl MacAddress {
    pub fn new(octets: [u8; 6]) -> Self {
        Self(eui48::MacAddress::new(octets))
    }

    pub fn octets(&self) -> [u8; 6] {
        let mut octets = [0u8; 6];
        octets.copy_from_slice(self.0.as_bytes());
        octets
    }
}

/// Rewrite a device-reported physical address into the colon form with
/// two digits per octet. SNMP agents drop leading zeros (`0:11:22:..`).
fn pad_octets(raw: &str) -> Option<String> {
    let separator = [':', '-'].into_iter().find(|sep| raw.contains(*sep));
    let groups: Vec<String> = match separator {
        Some(sep) => raw
            .split(sep)
            .map(|g| match g.len() {
                1 => format!("0{g}"),
                _ => g.to_string(),
            })
            .collect(),
        None => {
            let digits: String = raw.chars().filter(|c| *c != '.').collect();
            if digits.len() != 12 || !digits.is_ascii() {
                return None;
            }
            (0..6).map(|i| digits[i * 2..i * 2 + 2].to_string()).collect()
        }
    };
    Some(groups.join(":"))
}

impl FromStr for MacAddress {
    type Err = CoreError;

    /// Accepts colon or dash groups (leading zeros optional), Cisco
    /// `0011.2233.4455`, and bare 12-digit hex.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CoreError::InvalidMac(s.to_string());
        let padded = pad_octets(s.trim()).ok_or_else(invalid)?;
        eui48::MacAddress::parse_str(&padded)
            .map(Self)
            .map_err(|_| invalid())
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.octets();
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl TryFrom<String> for MacAddress {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_formats() {
        let expected = MacAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        for raw in [
            "00:11:22:33:44:55",
            "0:11:22:33:44:55",
            "00-11-22-33-44-55",
            "0011.2233.4455",
            "001122334455",
        ] {
            assert_eq!(raw.parse::<MacAddress>().unwrap(), expected, "{raw}");
        }
        assert_eq!(expected.to_string(), "00:11:22:33:44:55");
    }

    #[test]
    fn test_mac_restores_dropped_zeros() {
        let mac: MacAddress = "0:1b:2:c:44:5".parse().unwrap();
        assert_eq!(mac.octets(), [0x00, 0x1b, 0x02, 0x0c, 0x44, 0x05]);
        assert_eq!(mac.to_string(), "00:1b:02:0c:44:05");
        assert_eq!(pad_octets("a-b-c-d-e-f").as_deref(), Some("0a:0b:0c:0d:0e:0f"));
    }

    #[test]
    fn test_mac_rejects_garbage() {
        assert!("00:11:22:33:44".parse::<MacAddress>().is_err());
        assert!("00:11:22:33:44:zz".parse::<MacAddress>().is_err());
        assert!("".parse::<MacAddress>().is_err());
        assert!("000:11:22:33:44:55".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_address_record_serializes_display_form() {
        let record = AddressRecord {
            id: AddressId(7),
            subnet_id: SubnetId(1),
            address: address::to_canonical("10.0.0.5").unwrap(),
            mac: Some("aa:bb:cc:dd:ee:ff".parse().unwrap()),
            hostname: None,
            status: AddressStatus::Online,
            last_seen: None,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["address"], "10.0.0.5");
        assert_eq!(json["mac"], "aa:bb:cc:dd:ee:ff");
        assert_eq!(json["status"], "online");

        let back: AddressRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_unknown_query_kind_is_unsupported() {
        let kinds: Vec<QueryKind> =
            serde_json::from_str(r#"["arp_table", "routing_table"]"#).unwrap();
        assert_eq!(kinds, vec![QueryKind::ArpTable, QueryKind::Unsupported]);
    }

    #[test]
    fn test_subnet_label_falls_back_to_cidr() {
        let subnet: Subnet = serde_json::from_str(
            r#"{"id": 3, "section_id": 1, "network": "10.0.0.0", "mask": 24}"#,
        )
        .unwrap();
        assert_eq!(subnet.label(), "10.0.0.0/24");
        assert_eq!(subnet.scan_agent, AgentId::LOCAL);
        assert!(!subnet.discovery_enabled);
    }
}
