//! In-memory inventory snapshot and the query/mutation logic shared by the
//! store backends.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::address;
use tally_core::{
    AddressId, AddressRecord, AddressStatus, Agent, AgentId, Device, MacAddress, NewAddress,
    QueryKind, Subnet, SubnetId,
};

use crate::error::{Result, StoreError};
use crate::store::ResolveScope;

/// Complete inventory contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub subnets: Vec<Subnet>,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub addresses: Vec<AddressRecord>,
}

impl Inventory {
    /// Reject snapshots that hold more than one record per (subnet, address).
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for record in &self.addresses {
            if !seen.insert((record.subnet_id, record.address)) {
                return Err(StoreError::Duplicate {
                    subnet_id: record.subnet_id,
                    address: record.display(),
                });
            }
        }
        Ok(())
    }

    pub fn discovery_subnets(&self, agent: AgentId) -> Vec<Subnet> {
        self.subnets
            .iter()
            .filter(|s| s.discovery_enabled && s.scan_agent == agent)
            .cloned()
            .collect()
    }

    pub fn resolve_subnets(&self, agent: AgentId) -> Vec<Subnet> {
        self.subnets
            .iter()
            .filter(|s| s.resolve_dns && s.scan_agent == agent)
            .cloned()
            .collect()
    }

    pub fn subnet(&self, id: SubnetId) -> Option<Subnet> {
        self.subnets.iter().find(|s| s.id == id).cloned()
    }

    pub fn has_child_subnets(&self, id: SubnetId) -> bool {
        self.subnets
            .iter()
            .any(|s| s.master_subnet_id == Some(id))
    }

    pub fn devices_with_query(&self, kind: QueryKind) -> Vec<Device> {
        self.devices
            .iter()
            .filter(|d| d.supports(kind))
            .cloned()
            .collect()
    }

    pub fn subnet_addresses(&self, subnet: SubnetId) -> Vec<AddressRecord> {
        self.addresses
            .iter()
            .filter(|a| a.subnet_id == subnet)
            .cloned()
            .collect()
    }

    pub fn insert_address(&mut self, new: NewAddress) -> Result<AddressId> {
        let exists = self
            .addresses
            .iter()
            .any(|a| a.subnet_id == new.subnet_id && a.address == new.address);
        if exists {
            return Err(StoreError::Duplicate {
                subnet_id: new.subnet_id,
                address: address::to_display(new.address),
            });
        }

        let id = AddressId(self.addresses.iter().map(|a| a.id.0).max().unwrap_or(0) + 1);
        self.addresses.push(AddressRecord {
            id,
            subnet_id: new.subnet_id,
            address: new.address,
            mac: new.mac,
            hostname: None,
            status: new.status,
            last_seen: None,
        });
        Ok(id)
    }

    pub fn confirm_address(
        &mut self,
        id: AddressId,
        mac: Option<MacAddress>,
        seen_at: DateTime<Utc>,
    ) -> Result<()> {
        let record = self.address_mut(id)?;
        record.status = AddressStatus::Online;
        if mac.is_some() {
            record.mac = mac;
        }
        record.last_seen = Some(seen_at);
        Ok(())
    }

    pub fn addresses_for_resolve(&self, scope: &ResolveScope, empty_only: bool) -> Vec<AddressRecord> {
        let mut out: Vec<AddressRecord> = self
            .addresses
            .iter()
            .filter(|a| match scope {
                ResolveScope::All => true,
                ResolveScope::Subnets(ids) => ids.contains(&a.subnet_id),
            })
            .filter(|a| !empty_only || !a.has_hostname())
            .cloned()
            .collect();
        out.sort_by_key(|a| a.address);
        out
    }

    pub fn update_hostname(&mut self, id: AddressId, hostname: &str) -> Result<()> {
        self.address_mut(id)?.hostname = Some(hostname.to_string());
        Ok(())
    }

    pub fn mark_subnet_discovered(&mut self, id: SubnetId, at: DateTime<Utc>) -> Result<()> {
        self.subnet_mut(id)?.last_discovery = Some(at);
        Ok(())
    }

    pub fn mark_subnet_scanned(&mut self, id: SubnetId, at: DateTime<Utc>) -> Result<()> {
        self.subnet_mut(id)?.last_scan = Some(at);
        Ok(())
    }

    pub fn mark_agent_checked(&mut self, id: AgentId, at: DateTime<Utc>) -> Result<()> {
        let agent = self
            .agents
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::NotFound { kind: "Agent", id: id.0 })?;
        agent.last_checked = Some(at);
        Ok(())
    }

    fn address_mut(&mut self, id: AddressId) -> Result<&mut AddressRecord> {
        self.addresses
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::NotFound { kind: "Address", id: id.0 })
    }

    fn subnet_mut(&mut self, id: SubnetId) -> Result<&mut Subnet> {
        self.subnets
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::NotFound { kind: "Subnet", id: id.0 })
    }
}
