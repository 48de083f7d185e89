//! `snmpwalk -On` output parsing for address-resolution tables.
//!
//! Each line looks like
//! `.1.3.6.1.2.1.4.22.1.2.3.10.0.0.5 = Hex-STRING: 00 11 22 33 44 55`:
//! the OID suffix after the table column encodes the interface index and the
//! IP address, the value carries the physical address.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use tally_core::{DiscoveredEntry, QueryKind};
use thiserror::Error;

/// `IP-MIB::ipNetToMediaPhysAddress`.
pub const ARP_TABLE_OID: &str = ".1.3.6.1.2.1.4.22.1.2";

/// `IP-MIB::ipNetToPhysicalPhysAddress`.
pub const NEIGHBOR_TABLE_OID: &str = ".1.3.6.1.2.1.4.35.1.4";

/// Markers net-snmp prints instead of rows when a table is absent or empty.
const EMPTY_MARKERS: [&str; 3] = [
    "No Such Object",
    "No Such Instance",
    "No more variables left",
];

#[derive(Error, Debug, PartialEq, Eq)]
#[error("line {line}: {reason}")]
pub struct WalkError {
    pub line: usize,
    pub reason: String,
}

/// Column OID walked for a query kind.
pub fn table_oid(kind: QueryKind) -> Option<&'static str> {
    match kind {
        QueryKind::ArpTable => Some(ARP_TABLE_OID),
        QueryKind::NeighborTable => Some(NEIGHBOR_TABLE_OID),
        QueryKind::Unsupported => None,
    }
}

/// Parse a full walk of `kind`'s table into discovered entries.
///
/// Rows with an empty physical address (incomplete ARP entries) and
/// scoped neighbor entries are dropped. Any line that cannot be understood
/// makes the whole response malformed.
pub fn parse_walk(output: &str, kind: QueryKind) -> Result<Vec<DiscoveredEntry>, WalkError> {
    let base = table_oid(kind).ok_or_else(|| WalkError {
        line: 0,
        reason: format!("{kind:?} has no table OID"),
    })?;

    let mut entries = Vec::new();

    for (idx, raw) in output.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || EMPTY_MARKERS.iter().any(|m| line.contains(m)) {
            continue;
        }

        let malformed = |reason: &str| WalkError {
            line: line_no,
            reason: format!("{reason}: {line}"),
        };

        let (oid, value) = line
            .split_once(" = ")
            .ok_or_else(|| malformed("missing ' = ' separator"))?;

        let index = oid
            .strip_prefix(base)
            .and_then(|rest| rest.strip_prefix('.'))
            .ok_or_else(|| malformed("OID outside the walked table"))?;

        let octets = parse_index(index).ok_or_else(|| malformed("non-numeric OID index"))?;

        let ip = match kind {
            QueryKind::ArpTable => arp_address(&octets),
            QueryKind::NeighborTable => match neighbor_address(&octets) {
                Some(Some(ip)) => Some(ip),
                Some(None) => continue,
                None => None,
            },
            QueryKind::Unsupported => None,
        }
        .ok_or_else(|| malformed("OID index does not encode an address"))?;

        let mac = parse_value(value).ok_or_else(|| malformed("unrecognized value"))?;
        if mac.is_empty() {
            continue;
        }

        entries.push(DiscoveredEntry::new(ip.to_string(), mac));
    }

    Ok(entries)
}

fn parse_index(index: &str) -> Option<Vec<u32>> {
    index.split('.').map(|p| p.parse::<u32>().ok()).collect()
}

/// `ifIndex.a.b.c.d`
fn arp_address(index: &[u32]) -> Option<IpAddr> {
    match index {
        [_if_index, a, b, c, d] => Some(IpAddr::V4(Ipv4Addr::new(
            octet(*a)?,
            octet(*b)?,
            octet(*c)?,
            octet(*d)?,
        ))),
        _ => None,
    }
}

/// `ifIndex.type.len.octets...`; `Some(None)` for address types we skip.
fn neighbor_address(index: &[u32]) -> Option<Option<IpAddr>> {
    let [_if_index, addr_type, len, rest @ ..] = index else {
        return None;
    };
    if *len as usize != rest.len() {
        return None;
    }
    let bytes: Vec<u8> = rest.iter().map(|v| octet(*v)).collect::<Option<_>>()?;

    match (*addr_type, bytes.len()) {
        (1, 4) => Some(Some(IpAddr::V4(Ipv4Addr::new(
            bytes[0], bytes[1], bytes[2], bytes[3],
        )))),
        (2, 16) => {
            let mut raw = [0u8; 16];
            raw.copy_from_slice(&bytes);
            Some(Some(IpAddr::V6(Ipv6Addr::from(raw))))
        }
        // ipv4z / ipv6z carry a zone index and are link-scoped.
        (3, 8) | (4, 20) => Some(None),
        _ => None,
    }
}

fn octet(v: u32) -> Option<u8> {
    u8::try_from(v).ok()
}

/// Physical address from a value; empty string for zero-length values.
fn parse_value(value: &str) -> Option<String> {
    let value = value.trim();
    if value == "\"\"" {
        return Some(String::new());
    }
    if let Some(hex) = value.strip_prefix("Hex-STRING:") {
        let octets: Vec<&str> = hex.split_whitespace().collect();
        if octets
            .iter()
            .any(|o| o.len() != 2 || !o.chars().all(|c| c.is_ascii_hexdigit()))
        {
            return None;
        }
        return Some(octets.join(":"));
    }
    if let Some(text) = value.strip_prefix("STRING:") {
        return Some(text.trim().trim_matches('"').to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARP_WALK: &str = "\
.1.3.6.1.2.1.4.22.1.2.3.10.0.0.1 = Hex-STRING: 00 1A 2B 3C 4D 5E
.1.3.6.1.2.1.4.22.1.2.3.10.0.0.5 = STRING: 0:11:22:33:44:55
.1.3.6.1.2.1.4.22.1.2.7.192.168.5.20 = Hex-STRING: AA BB CC DD EE FF
.1.3.6.1.2.1.4.22.1.2.3.10.0.0.77 = \"\"
";

    #[test]
    fn test_parse_arp_walk() {
        let entries = parse_walk(ARP_WALK, QueryKind::ArpTable).unwrap();
        assert_eq!(
            entries,
            vec![
                DiscoveredEntry::new("10.0.0.1", "00:1A:2B:3C:4D:5E"),
                DiscoveredEntry::new("10.0.0.5", "0:11:22:33:44:55"),
                DiscoveredEntry::new("192.168.5.20", "AA:BB:CC:DD:EE:FF"),
            ]
        );
    }

    #[test]
    fn test_parse_neighbor_walk() {
        let output = "\
.1.3.6.1.2.1.4.35.1.4.2.1.4.10.0.0.9 = Hex-STRING: 00 11 22 33 44 66
.1.3.6.1.2.1.4.35.1.4.2.2.16.32.1.13.184.0.0.0.0.0.0.0.0.0.0.0.66 = Hex-STRING: 00 11 22 33 44 77
.1.3.6.1.2.1.4.35.1.4.2.4.20.254.128.0.0.0.0.0.0.0.0.0.0.0.0.0.1.0.0.0.2 = Hex-STRING: 00 11 22 33 44 88
";
        let entries = parse_walk(output, QueryKind::NeighborTable).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].address, "10.0.0.9");
        assert_eq!(entries[1].address, "2001:db8::42");
    }

    #[test]
    fn test_empty_table_is_not_an_error() {
        let output = ".1.3.6.1.2.1.4.22.1.2 = No Such Object available on this agent at this OID\n";
        assert!(parse_walk(output, QueryKind::ArpTable).unwrap().is_empty());
        assert!(parse_walk("", QueryKind::ArpTable).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_output() {
        let err = parse_walk("Timeout: No Response from 10.9.9.9", QueryKind::ArpTable).unwrap_err();
        assert_eq!(err.line, 1);

        let err = parse_walk(
            ".1.3.6.1.2.1.4.22.1.2.3.10.0.0.1 = INTEGER: 4\n",
            QueryKind::ArpTable,
        )
        .unwrap_err();
        assert!(err.reason.starts_with("unrecognized value"));

        let err = parse_walk(
            ".1.3.6.1.2.1.4.22.1.2.3.10.0.300.1 = Hex-STRING: 00 11 22 33 44 55\n",
            QueryKind::ArpTable,
        )
        .unwrap_err();
        assert!(err.reason.contains("does not encode an address"));
    }

    #[test]
    fn test_unsupported_kind_has_no_oid() {
        assert_eq!(table_oid(QueryKind::Unsupported), None);
        assert!(parse_walk("", QueryKind::Unsupported).is_err());
    }
}
