//! Change summary for a discovery pass.
//!
//! Lists new hosts and existing hosts whose status or physical address
//! moved during the pass, for operators reviewing an unattended run.

use tally_core::address::{self, Canonical};
use tally_core::{AddressStatus, MacAddress};

use crate::baseline::Baseline;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    /// Inserted during this pass.
    New,
    /// Known address that was not Online before this pass.
    CameOnline { previous: AddressStatus },
    /// Online before and after, but reported with a different physical address.
    MacChanged { previous: Option<MacAddress> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressChange {
    pub subnet: String,
    pub address: Canonical,
    pub mac: Option<MacAddress>,
    pub kind: ChangeKind,
}

/// Collect the changes recorded in a subnet's baseline after reconciliation.
pub fn changes_for(subnet_label: &str, baseline: &Baseline) -> Vec<AddressChange> {
    baseline
        .iter()
        .filter(|(_, entry)| entry.is_confirmed())
        .filter_map(|(addr, entry)| {
            let kind = if entry.inserted {
                ChangeKind::New
            } else if entry.previous_status != AddressStatus::Online {
                ChangeKind::CameOnline {
                    previous: entry.previous_status,
                }
            } else if entry.mac != entry.previous_mac {
                ChangeKind::MacChanged {
                    previous: entry.previous_mac,
                }
            } else {
                return None;
            };

            Some(AddressChange {
                subnet: subnet_label.to_string(),
                address: addr,
                mac: entry.mac,
                kind,
            })
        })
        .collect()
}

#[derive(Debug, Default, Clone)]
pub struct ChangeSummary {
    pub changes: Vec<AddressChange>,
}

impl ChangeSummary {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn new_count(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| c.kind == ChangeKind::New)
            .count()
    }

    /// Plain-text rendering, one line per change.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for change in &self.changes {
            let ip = address::to_display(change.address);
            let mac = mac_or_dash(change.mac);
            let line = match &change.kind {
                ChangeKind::New => format!("[{}] new host {ip} ({mac})", change.subnet),
                ChangeKind::CameOnline { previous } => format!(
                    "[{}] {ip} ({mac}) changed {previous} -> Online",
                    change.subnet
                ),
                ChangeKind::MacChanged { previous } => format!(
                    "[{}] {ip} physical address changed {} -> {mac}",
                    change.subnet,
                    mac_or_dash(*previous)
                ),
            };
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

fn mac_or_dash(mac: Option<MacAddress>) -> String {
    mac.map(|m| m.to_string()).unwrap_or_else(|| "-".to_string())
}
