//! JSON-file-backed inventory store.
//!
//! The whole inventory lives in one JSON document. Reads are served from
//! memory; every mutation rewrites the file through a temp file and rename so
//! a crash never leaves a half-written inventory behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use tally_core::{
    AddressId, AddressRecord, AgentId, Device, MacAddress, NewAddress, QueryKind, Subnet, SubnetId,
};

use crate::error::Result;
use crate::inventory::Inventory;
use crate::memory::MemoryStore;
use crate::store::{InventoryStore, ResolveScope};

pub struct JsonFileStore {
    path: PathBuf,
    memory: MemoryStore,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Load the inventory at `path`. A missing file is an empty inventory.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inventory = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Inventory>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Inventory file not found, starting empty");
                Inventory::default()
            }
            Err(e) => return Err(e.into()),
        };
        inventory.validate()?;

        tracing::info!(
            path = %path.display(),
            subnets = inventory.subnets.len(),
            devices = inventory.devices.len(),
            addresses = inventory.addresses.len(),
            "Inventory loaded"
        );

        Ok(Self {
            path,
            memory: MemoryStore::new(inventory),
            write_lock: Mutex::new(()),
        })
    }

    /// Apply `mutate` to a copy of the inventory, write the copy to disk,
    /// and only then make it visible. A failed write leaves memory and disk
    /// on the previous state.
    async fn commit<T>(&self, mutate: impl FnOnce(&mut Inventory) -> Result<T>) -> Result<T> {
        let _guard = self.write_lock.lock().await;
        let mut next = self.memory.snapshot().await;
        let out = mutate(&mut next)?;

        if let Err(e) = self.write(&next).await {
            tracing::error!(path = %self.path.display(), error = %e, "Inventory write failed, change discarded");
            return Err(e);
        }
        self.memory.replace(next).await;
        Ok(out)
    }

    async fn write(&self, inventory: &Inventory) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(inventory)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for JsonFileStore {
    async fn discovery_subnets(&self, agent: AgentId) -> Result<Vec<Subnet>> {
        self.memory.discovery_subnets(agent).await
    }

    async fn resolve_subnets(&self, agent: AgentId) -> Result<Vec<Subnet>> {
        self.memory.resolve_subnets(agent).await
    }

    async fn subnet(&self, id: SubnetId) -> Result<Option<Subnet>> {
        self.memory.subnet(id).await
    }

    async fn has_child_subnets(&self, id: SubnetId) -> Result<bool> {
        self.memory.has_child_subnets(id).await
    }

    async fn devices_with_query(&self, kind: QueryKind) -> Result<Vec<Device>> {
        self.memory.devices_with_query(kind).await
    }

    async fn subnet_addresses(&self, subnet: SubnetId) -> Result<Vec<AddressRecord>> {
        self.memory.subnet_addresses(subnet).await
    }

    async fn insert_address(&self, new: NewAddress) -> Result<AddressId> {
        self.commit(|inv| inv.insert_address(new)).await
    }

    async fn confirm_address(
        &self,
        id: AddressId,
        mac: Option<MacAddress>,
        seen_at: DateTime<Utc>,
    ) -> Result<()> {
        self.commit(|inv| inv.confirm_address(id, mac, seen_at)).await
    }

    async fn addresses_for_resolve(
        &self,
        scope: &ResolveScope,
        empty_only: bool,
    ) -> Result<Vec<AddressRecord>> {
        self.memory.addresses_for_resolve(scope, empty_only).await
    }

    async fn update_hostname(&self, id: AddressId, hostname: &str) -> Result<()> {
        self.commit(|inv| inv.update_hostname(id, hostname)).await
    }

    async fn mark_subnet_discovered(&self, id: SubnetId, at: DateTime<Utc>) -> Result<()> {
        self.commit(|inv| inv.mark_subnet_discovered(id, at)).await
    }

    async fn mark_subnet_scanned(&self, id: SubnetId, at: DateTime<Utc>) -> Result<()> {
        self.commit(|inv| inv.mark_subnet_scanned(id, at)).await
    }

    async fn mark_agent_checked(&self, id: AgentId, at: DateTime<Utc>) -> Result<()> {
        self.commit(|inv| inv.mark_agent_checked(id, at)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{address, AddressStatus};

    const SAMPLE: &str = r#"{
        "agents": [{"id": 1, "name": "localhost"}],
        "subnets": [
            {"id": 1, "section_id": 1, "network": "10.0.0.0", "mask": 24,
             "discovery_enabled": true}
        ],
        "devices": [
            {"id": 1, "hostname": "core-sw1", "queries": ["arp_table"], "sections": [1]}
        ],
        "addresses": [
            {"id": 1, "subnet_id": 1, "address": "10.0.0.5", "status": "offline"}
        ]
    }"#;

    #[tokio::test]
    async fn test_open_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("inventory.json"))
            .await
            .unwrap();
        assert!(store.discovery_subnets(AgentId::LOCAL).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mutations_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let store = JsonFileStore::open(&path).await.unwrap();
        let id = store
            .insert_address(NewAddress {
                subnet_id: SubnetId(1),
                address: address::to_canonical("10.0.0.9").unwrap(),
                mac: Some("00:11:22:33:44:55".parse().unwrap()),
                status: AddressStatus::Online,
            })
            .await
            .unwrap();
        assert_eq!(id, AddressId(2));

        let now = Utc::now();
        store.mark_agent_checked(AgentId::LOCAL, now).await.unwrap();

        let reopened = JsonFileStore::open(&path).await.unwrap();
        let addresses = reopened.subnet_addresses(SubnetId(1)).await.unwrap();
        assert_eq!(addresses.len(), 2);
        assert_eq!(addresses[1].display(), "10.0.0.9");
        assert!(!dir.path().join("inventory.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_open_rejects_duplicate_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        std::fs::write(
            &path,
            r#"{"addresses": [
                {"id": 1, "subnet_id": 1, "address": "10.0.0.5"},
                {"id": 2, "subnet_id": 1, "address": "10.0.0.5"}
            ]}"#,
        )
        .unwrap();

        assert!(JsonFileStore::open(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_write_discards_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        std::fs::write(&path, SAMPLE).unwrap();
        let store = JsonFileStore::open(&path).await.unwrap();

        // A directory in the temp file's place makes every write fail.
        std::fs::create_dir(dir.path().join("inventory.json.tmp")).unwrap();

        let result = store
            .insert_address(NewAddress {
                subnet_id: SubnetId(1),
                address: address::to_canonical("10.0.0.9").unwrap(),
                mac: None,
                status: AddressStatus::Online,
            })
            .await;
        assert!(result.is_err());

        let now = Utc::now();
        assert!(store.confirm_address(AddressId(1), None, now).await.is_err());

        let addresses = store.subnet_addresses(SubnetId(1)).await.unwrap();
        assert_eq!(addresses.len(), 1);
        assert_eq!(addresses[0].status, AddressStatus::Offline);
        assert_eq!(addresses[0].last_seen, None);

        // Once the obstruction is gone the next write lands normally.
        std::fs::remove_dir(dir.path().join("inventory.json.tmp")).unwrap();
        store.confirm_address(AddressId(1), None, now).await.unwrap();
        let reopened = JsonFileStore::open(&path).await.unwrap();
        let addresses = reopened.subnet_addresses(SubnetId(1)).await.unwrap();
        assert_eq!(addresses.len(), 1);
        assert_eq!(addresses[0].status, AddressStatus::Online);
    }
}
