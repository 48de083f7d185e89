//! The inventory store contract consumed by discovery and DNS reconciliation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tally_core::{
    AddressId, AddressRecord, AgentId, Device, MacAddress, NewAddress, QueryKind, Subnet, SubnetId,
};

use crate::error::Result;

/// Which addresses the DNS loop works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveScope {
    /// Every address in the inventory.
    All,
    /// Only addresses inside these subnets.
    Subnets(Vec<SubnetId>),
}

/// Read/write access to the persistent address inventory.
///
/// Every operation may fail with a store-level error; callers decide how far
/// that failure propagates.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Subnets with discovery enabled whose scan agent is `agent`.
    async fn discovery_subnets(&self, agent: AgentId) -> Result<Vec<Subnet>>;

    /// Subnets with DNS resolution enabled whose scan agent is `agent`.
    async fn resolve_subnets(&self, agent: AgentId) -> Result<Vec<Subnet>>;

    async fn subnet(&self, id: SubnetId) -> Result<Option<Subnet>>;

    /// Whether any subnet names `id` as its master.
    async fn has_child_subnets(&self, id: SubnetId) -> Result<bool>;

    /// Devices that have `kind` among their configured queries.
    async fn devices_with_query(&self, kind: QueryKind) -> Result<Vec<Device>>;

    async fn subnet_addresses(&self, subnet: SubnetId) -> Result<Vec<AddressRecord>>;

    /// Insert a new record and return its assigned identifier.
    ///
    /// Fails with [`StoreError::Duplicate`](crate::StoreError::Duplicate) if
    /// the (subnet, address) pair already exists.
    async fn insert_address(&self, new: NewAddress) -> Result<AddressId>;

    /// Mark a record Online with a fresh last-seen time. A `None` physical
    /// address leaves the stored one untouched.
    async fn confirm_address(
        &self,
        id: AddressId,
        mac: Option<MacAddress>,
        seen_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Addresses for the DNS loop, ordered by canonical address ascending.
    async fn addresses_for_resolve(
        &self,
        scope: &ResolveScope,
        empty_only: bool,
    ) -> Result<Vec<AddressRecord>>;

    async fn update_hostname(&self, id: AddressId, hostname: &str) -> Result<()>;

    async fn mark_subnet_discovered(&self, id: SubnetId, at: DateTime<Utc>) -> Result<()>;

    async fn mark_subnet_scanned(&self, id: SubnetId, at: DateTime<Utc>) -> Result<()>;

    async fn mark_agent_checked(&self, id: AgentId, at: DateTime<Utc>) -> Result<()>;
}
