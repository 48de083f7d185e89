//! Configuration for discovery and DNS reconciliation passes.

use std::net::IpAddr;
use std::time::Duration;

use serde::Deserialize;
use tally_core::{AgentId, NameserverId, QueryKind};

/// Top-level discover configuration.
///
/// Loaded from the `tally.toml` `[discover]` section or
/// `TALLY__DISCOVER__*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Which device table to query for discovery.
    #[serde(default)]
    pub check_method: CheckMethod,

    /// Emit a change summary at the end of a discovery pass.
    #[serde(default = "default_true")]
    pub send_mail_on_change: bool,

    /// Restrict the DNS loop to addresses without a hostname.
    #[serde(default)]
    pub resolve_empty_only: bool,

    /// Print every hostname update made by the DNS loop.
    #[serde(default)]
    pub resolve_verbose: bool,

    /// Agent identity used when none is given on the command line.
    #[serde(default)]
    pub agent_id: AgentId,

    /// Path to the JSON inventory file.
    #[serde(default = "default_inventory_path")]
    pub inventory_path: String,

    /// Path to the net-snmp `snmpwalk` binary.
    #[serde(default = "default_snmpwalk_path")]
    pub snmpwalk_path: String,

    /// Upper bound for a single device query, in seconds.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Subnets reconciled at the same time.
    #[serde(default = "default_max_concurrent_subnets")]
    pub max_concurrent_subnets: usize,

    /// Device queries in flight per subnet.
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,

    /// Nameserver sets referenced by subnets for reverse lookups.
    #[serde(default)]
    pub nameservers: Vec<NameserverSet>,
}

/// Device table used to find active hosts.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckMethod {
    /// IPv4 ARP table.
    #[default]
    Arp,
    /// Version-independent neighbor table.
    Neighbor,
    /// Discovery disabled.
    None,
}

impl CheckMethod {
    /// The device query for this method, `None` when discovery is disabled.
    pub fn query_kind(&self) -> Option<QueryKind> {
        match self {
            Self::Arp => Some(QueryKind::ArpTable),
            Self::Neighbor => Some(QueryKind::NeighborTable),
            Self::None => None,
        }
    }
}

/// A named group of DNS servers.
#[derive(Debug, Clone, Deserialize)]
pub struct NameserverSet {
    pub id: NameserverId,
    pub servers: Vec<IpAddr>,
}

impl DiscoverConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs.max(1))
    }
}

fn default_true() -> bool {
    true
}

fn default_inventory_path() -> String {
    "./inventory.json".to_string()
}

fn default_snmpwalk_path() -> String {
    "snmpwalk".to_string()
}

fn default_query_timeout() -> u64 {
    30
}

fn default_max_concurrent_subnets() -> usize {
    4
}

fn default_max_concurrent_queries() -> usize {
    8
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            check_method: CheckMethod::default(),
            send_mail_on_change: default_true(),
            resolve_empty_only: false,
            resolve_verbose: false,
            agent_id: AgentId::default(),
            inventory_path: default_inventory_path(),
            snmpwalk_path: default_snmpwalk_path(),
            query_timeout_secs: default_query_timeout(),
            max_concurrent_subnets: default_max_concurrent_subnets(),
            max_concurrent_queries: default_max_concurrent_queries(),
            nameservers: Vec::new(),
        }
    }
}
