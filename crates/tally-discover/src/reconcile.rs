//! Subnet reconciliation: merge device tables into the address inventory.
//!
//! For each subnet a [`Baseline`] of known addresses is loaded, every
//! authorized device is queried, and each in-subnet entry either confirms an
//! existing record or inserts a new one. Device queries run concurrently,
//! but their results are applied one at a time in device-selection order,
//! so when two devices disagree about a physical address the later device
//! wins.

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};

use tally_core::address::{self, Canonical, HostRange};
use tally_core::{
    AddressId, AddressRecord, AddressStatus, Device, DiscoveredEntry, MacAddress, NewAddress,
    QueryKind, Subnet,
};
use tally_store::{InventoryStore, StoreError};

use crate::baseline::{Baseline, Classification};
use crate::error::{DiscoverError, Result};
use crate::query::{self, DeviceQueryClient};
use crate::select;
use crate::summary::{self, AddressChange};
use crate::tracker::ScanScheduleTracker;

/// Shared, read-only inputs for reconciling subnets within one pass.
#[derive(Clone)]
pub struct ReconcileContext {
    pub store: Arc<dyn InventoryStore>,
    pub client: Arc<dyn DeviceQueryClient>,
    pub tracker: ScanScheduleTracker,
    pub kind: QueryKind,
    pub query_timeout: Duration,
    pub max_concurrent_queries: usize,
    /// Pass time, used for every last-seen and scan stamp.
    pub seen_at: DateTime<Utc>,
}

/// Outcome of reconciling one subnet.
#[derive(Debug, Clone)]
pub struct SubnetReport {
    pub subnet: Subnet,
    pub devices_queried: usize,
    pub devices_failed: usize,
    pub entries_evaluated: usize,
    pub entries_outside: usize,
    pub entries_rejected: usize,
    /// Existing records confirmed Online.
    pub confirmed: Vec<Canonical>,
    /// Records inserted during this pass.
    pub inserted: Vec<Canonical>,
    /// Known addresses no device reported.
    pub offline: Vec<Canonical>,
    pub changes: Vec<AddressChange>,
}

/// Result of inserting a host missing from the baseline.
enum Inserted {
    Created(AddressId),
    /// Someone else stored the address after the baseline was read.
    Existing(AddressRecord),
}

/// Reconciliation state for one subnet.
pub struct SubnetReconciler<'a> {
    store: &'a dyn InventoryStore,
    subnet: &'a Subnet,
    range: HostRange,
    baseline: Baseline,
    seen_at: DateTime<Utc>,
    devices_queried: usize,
    devices_failed: usize,
    entries_evaluated: usize,
    entries_outside: usize,
    entries_rejected: usize,
}

impl<'a> SubnetReconciler<'a> {
    /// Load the subnet's persisted records as the baseline.
    pub async fn load(
        store: &'a dyn InventoryStore,
        subnet: &'a Subnet,
        seen_at: DateTime<Utc>,
    ) -> Result<Self> {
        let range = subnet.range()?;
        let records = store.subnet_addresses(subnet.id).await?;
        let baseline = Baseline::from_records(subnet.id, &records);

        tracing::debug!(
            subnet_id = %subnet.id,
            cidr = %subnet.cidr(),
            known = baseline.len(),
            "Baseline loaded"
        );

        Ok(Self {
            store,
            subnet,
            range,
            baseline,
            seen_at,
            devices_queried: 0,
            devices_failed: 0,
            entries_evaluated: 0,
            entries_outside: 0,
            entries_rejected: 0,
        })
    }

    /// Apply one device's table. Store failures abort the subnet.
    pub async fn apply(&mut self, device: &Device, entries: &[DiscoveredEntry]) -> Result<()> {
        self.devices_queried += 1;
        tracing::info!(
            subnet_id = %self.subnet.id,
            cidr = %self.subnet.cidr(),
            device = %device.hostname,
            entries = entries.len(),
            "Found {} hosts in the table to evaluate",
            entries.len()
        );

        for entry in entries {
            self.apply_entry(device, entry).await?;
        }
        Ok(())
    }

    /// Log a failed device query; the subnet carries on with other devices.
    pub fn record_device_failure(&mut self, device: &Device, error: &DiscoverError) {
        self.devices_queried += 1;
        self.devices_failed += 1;
        tracing::error!(
            subnet_id = %self.subnet.id,
            cidr = %self.subnet.cidr(),
            device = %device.hostname,
            error = %error,
            "Error scanning device {}; skipping",
            device.hostname
        );
    }

    async fn apply_entry(&mut self, device: &Device, entry: &DiscoveredEntry) -> Result<()> {
        self.entries_evaluated += 1;

        let ip = match address::parse(&entry.address) {
            Ok(ip) => ip,
            Err(e) => {
                self.entries_rejected += 1;
                tracing::warn!(
                    subnet_id = %self.subnet.id,
                    device = %device.hostname,
                    address = %entry.address,
                    error = %e,
                    "Discarding table entry"
                );
                return Ok(());
            }
        };

        if !self.range.contains(&ip) {
            self.entries_outside += 1;
            return Ok(());
        }

        let canonical = address::canonical_of(&ip);
        let mac = self.parse_mac(device, entry);

        match self.baseline.classify(canonical) {
            Classification::Existing(id) => {
                tracing::info!(
                    subnet_id = %self.subnet.id,
                    device = %device.hostname,
                    address = %ip,
                    mac = %entry.mac,
                    "Found existing host {ip} in subnet {}; updating status",
                    self.subnet.label()
                );
                self.store.confirm_address(id, mac, self.seen_at).await?;
                self.baseline.confirm(canonical, mac);
            }
            Classification::New => {
                tracing::info!(
                    subnet_id = %self.subnet.id,
                    device = %device.hostname,
                    address = %ip,
                    mac = %entry.mac,
                    "Found new host {ip} in subnet {}; adding",
                    self.subnet.label()
                );
                match self.insert(canonical, mac).await? {
                    Inserted::Created(id) => {
                        self.store.confirm_address(id, mac, self.seen_at).await?;
                        self.baseline.record_insert(canonical, id, mac);
                    }
                    Inserted::Existing(record) => {
                        self.store.confirm_address(record.id, mac, self.seen_at).await?;
                        self.baseline.adopt(&record);
                        self.baseline.confirm(canonical, mac);
                    }
                }
            }
        }

        Ok(())
    }

    async fn insert(&self, canonical: Canonical, mac: Option<MacAddress>) -> Result<Inserted> {
        let new = NewAddress {
            subnet_id: self.subnet.id,
            address: canonical,
            mac,
            status: AddressStatus::Online,
        };

        match self.store.insert_address(new).await {
            Ok(id) => Ok(Inserted::Created(id)),
            // Inserted by a concurrent run after our baseline was read.
            Err(dup @ StoreError::Duplicate { .. }) => {
                tracing::warn!(
                    subnet_id = %self.subnet.id,
                    address = %address::to_display(canonical),
                    "Address appeared since baseline was loaded, confirming instead"
                );
                self.store
                    .subnet_addresses(self.subnet.id)
                    .await?
                    .into_iter()
                    .find(|r| r.address == canonical)
                    .map(Inserted::Existing)
                    .ok_or(DiscoverError::Store(dup))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn parse_mac(&self, device: &Device, entry: &DiscoveredEntry) -> Option<MacAddress> {
        match entry.mac.parse::<MacAddress>() {
            Ok(mac) => Some(mac),
            Err(e) => {
                tracing::warn!(
                    subnet_id = %self.subnet.id,
                    device = %device.hostname,
                    address = %entry.address,
                    error = %e,
                    "Ignoring unreadable physical address"
                );
                None
            }
        }
    }

    /// Close the subnet: whatever was never confirmed stays Offline.
    pub fn finish(self) -> SubnetReport {
        let mut confirmed = Vec::new();
        let mut inserted = Vec::new();
        for (addr, entry) in self.baseline.iter() {
            match (entry.is_confirmed(), entry.inserted) {
                (true, true) => inserted.push(addr),
                (true, false) => confirmed.push(addr),
                _ => {}
            }
        }
        let offline: Vec<Canonical> = self.baseline.unconfirmed().collect();
        let changes = summary::changes_for(&self.subnet.label(), &self.baseline);

        SubnetReport {
            subnet: self.subnet.clone(),
            devices_queried: self.devices_queried,
            devices_failed: self.devices_failed,
            entries_evaluated: self.entries_evaluated,
            entries_outside: self.entries_outside,
            entries_rejected: self.entries_rejected,
            confirmed,
            inserted,
            offline,
            changes,
        }
    }
}

/// Reconcile one subnet against every authorized device.
pub async fn reconcile_subnet(ctx: &ReconcileContext, subnet: &Subnet) -> Result<SubnetReport> {
    let devices = select::select_authorized(ctx.store.as_ref(), subnet, ctx.kind).await?;
    let mut reconciler = SubnetReconciler::load(ctx.store.as_ref(), subnet, ctx.seen_at).await?;

    let kind = ctx.kind;
    let limit = ctx.query_timeout;
    for device in &devices {
        tracing::info!(
            subnet_id = %subnet.id,
            cidr = %subnet.cidr(),
            device = %device.hostname,
            "Scanning subnet {} ({}) on device {}",
            subnet.label(),
            subnet.cidr(),
            device.hostname
        );
    }

    // Each query runs on its own task so a hung or cancelled device never
    // holds up the others; `buffered` hands results back in device order.
    let results = stream::iter(devices)
        .map(|device| {
            let client = Arc::clone(&ctx.client);
            async move {
                let handle =
                    tokio::spawn(query::query_with_timeout(client, device.clone(), kind, limit));
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(DiscoverError::DeviceQuery {
                        device: device.hostname.clone(),
                        reason: format!("query task failed: {e}"),
                    }),
                };
                (device, result)
            }
        })
        .buffered(ctx.max_concurrent_queries.max(1));
    let mut results = pin!(results);

    while let Some((device, result)) = results.next().await {
        match result {
            Ok(entries) => reconciler.apply(&device, &entries).await?,
            Err(e) => reconciler.record_device_failure(&device, &e),
        }
    }

    let report = reconciler.finish();
    ctx.tracker.mark_scan_complete(subnet.id, ctx.seen_at).await;

    tracing::info!(
        subnet_id = %subnet.id,
        cidr = %subnet.cidr(),
        devices = report.devices_queried,
        failed_devices = report.devices_failed,
        online = report.confirmed.len(),
        new = report.inserted.len(),
        offline = report.offline.len(),
        "Subnet scan complete"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{AgentId, DeviceId, SectionId, SnmpVersion, SubnetId};
    use tally_store::{Inventory, MemoryStore};

    use crate::summary::ChangeKind;

    fn subnet() -> Subnet {
        Subnet {
            id: SubnetId(1),
            section_id: SectionId(1),
            network: "10.0.0.0".parse().unwrap(),
            mask: 24,
            description: Some("lan".to_string()),
            master_subnet_id: None,
            discovery_enabled: true,
            resolve_dns: false,
            scan_agent: AgentId::LOCAL,
            nameserver_id: None,
            last_discovery: None,
            last_scan: None,
        }
    }

    fn device() -> Device {
        Device {
            id: DeviceId(1),
            hostname: "sw1".to_string(),
            snmp_version: SnmpVersion::V2c,
            snmp_community: "public".to_string(),
            queries: vec![QueryKind::ArpTable],
            sections: vec![SectionId(1)],
        }
    }

    fn known(id: u64, ip: &str) -> AddressRecord {
        AddressRecord {
            id: AddressId(id),
            subnet_id: SubnetId(1),
            address: address::to_canonical(ip).unwrap(),
            mac: None,
            hostname: None,
            status: AddressStatus::Offline,
            last_seen: None,
        }
    }

    #[tokio::test]
    async fn test_apply_skips_bad_and_foreign_entries() {
        let store = MemoryStore::new(Inventory {
            addresses: vec![known(1, "10.0.0.5")],
            ..Default::default()
        });
        let subnet = subnet();
        let now = Utc::now();

        let mut reconciler = SubnetReconciler::load(&store, &subnet, now).await.unwrap();
        reconciler
            .apply(
                &device(),
                &[
                    DiscoveredEntry::new("10.0.0.5", "00:11:22:33:44:55"),
                    DiscoveredEntry::new("10.0.1.5", "00:11:22:33:44:56"),
                    DiscoveredEntry::new("not-an-ip", "00:11:22:33:44:57"),
                    DiscoveredEntry::new("10.0.0.9", "garbage"),
                ],
            )
            .await
            .unwrap();
        let report = reconciler.finish();

        assert_eq!(report.entries_evaluated, 4);
        assert_eq!(report.entries_outside, 1);
        assert_eq!(report.entries_rejected, 1);
        assert_eq!(report.confirmed.len(), 1);
        assert_eq!(report.inserted, vec![address::to_canonical("10.0.0.9").unwrap()]);

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.addresses.len(), 2);
        let new = &snapshot.addresses[1];
        assert_eq!(new.status, AddressStatus::Online);
        assert_eq!(new.mac, None);
        assert_eq!(new.last_seen, Some(now));
    }

    #[tokio::test]
    async fn test_duplicate_insert_falls_back_to_confirm() {
        let store = MemoryStore::new(Inventory::default());
        let subnet = subnet();
        let now = Utc::now();

        let mut reconciler = SubnetReconciler::load(&store, &subnet, now).await.unwrap();

        // Another run inserts the address after the baseline was read.
        store
            .insert_address(NewAddress {
                subnet_id: SubnetId(1),
                address: address::to_canonical("10.0.0.9").unwrap(),
                mac: None,
                status: AddressStatus::Offline,
            })
            .await
            .unwrap();

        reconciler
            .apply(&device(), &[DiscoveredEntry::new("10.0.0.9", "00:11:22:33:44:55")])
            .await
            .unwrap();

        let report = reconciler.finish();
        let canonical = address::to_canonical("10.0.0.9").unwrap();
        assert!(report.inserted.is_empty());
        assert_eq!(report.confirmed, vec![canonical]);
        assert_eq!(report.changes.len(), 1);
        assert!(matches!(
            report.changes[0].kind,
            ChangeKind::CameOnline {
                previous: AddressStatus::Offline
            }
        ));

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.addresses.len(), 1);
        assert_eq!(snapshot.addresses[0].status, AddressStatus::Online);
        assert_eq!(snapshot.addresses[0].last_seen, Some(now));
    }
}
