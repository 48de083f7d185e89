//! In-memory inventory store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use tally_core::{
    AddressId, AddressRecord, AgentId, Device, MacAddress, NewAddress, QueryKind, Subnet, SubnetId,
};

use crate::error::Result;
use crate::inventory::Inventory;
use crate::store::{InventoryStore, ResolveScope};

/// Inventory held behind an async read/write lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inventory>,
}

impl MemoryStore {
    pub fn new(inventory: Inventory) -> Self {
        Self {
            inner: RwLock::new(inventory),
        }
    }

    /// Clone of the current contents.
    pub async fn snapshot(&self) -> Inventory {
        self.inner.read().await.clone()
    }

    /// Swap in new contents wholesale.
    pub async fn replace(&self, inventory: Inventory) {
        *self.inner.write().await = inventory;
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn discovery_subnets(&self, agent: AgentId) -> Result<Vec<Subnet>> {
        Ok(self.inner.read().await.discovery_subnets(agent))
    }

    async fn resolve_subnets(&self, agent: AgentId) -> Result<Vec<Subnet>> {
        Ok(self.inner.read().await.resolve_subnets(agent))
    }

    async fn subnet(&self, id: SubnetId) -> Result<Option<Subnet>> {
        Ok(self.inner.read().await.subnet(id))
    }

    async fn has_child_subnets(&self, id: SubnetId) -> Result<bool> {
        Ok(self.inner.read().await.has_child_subnets(id))
    }

    async fn devices_with_query(&self, kind: QueryKind) -> Result<Vec<Device>> {
        Ok(self.inner.read().await.devices_with_query(kind))
    }

    async fn subnet_addresses(&self, subnet: SubnetId) -> Result<Vec<AddressRecord>> {
        Ok(self.inner.read().await.subnet_addresses(subnet))
    }

    async fn insert_address(&self, new: NewAddress) -> Result<AddressId> {
        self.inner.write().await.insert_address(new)
    }

    async fn confirm_address(
        &self,
        id: AddressId,
        mac: Option<MacAddress>,
        seen_at: DateTime<Utc>,
    ) -> Result<()> {
        self.inner.write().await.confirm_address(id, mac, seen_at)
    }

    async fn addresses_for_resolve(
        &self,
        scope: &ResolveScope,
        empty_only: bool,
    ) -> Result<Vec<AddressRecord>> {
        Ok(self.inner.read().await.addresses_for_resolve(scope, empty_only))
    }

    async fn update_hostname(&self, id: AddressId, hostname: &str) -> Result<()> {
        self.inner.write().await.update_hostname(id, hostname)
    }

    async fn mark_subnet_discovered(&self, id: SubnetId, at: DateTime<Utc>) -> Result<()> {
        self.inner.write().await.mark_subnet_discovered(id, at)
    }

    async fn mark_subnet_scanned(&self, id: SubnetId, at: DateTime<Utc>) -> Result<()> {
        self.inner.write().await.mark_subnet_scanned(id, at)
    }

    async fn mark_agent_checked(&self, id: AgentId, at: DateTime<Utc>) -> Result<()> {
        self.inner.write().await.mark_agent_checked(id, at)
    }
}
