//! Subnet and device selection for a discovery pass.

use chrono::{DateTime, Utc};
use tally_core::{AgentId, Device, QueryKind, Subnet};
use tally_store::InventoryStore;

use crate::error::{DiscoverError, Result};
use crate::tracker::ScanScheduleTracker;

/// Subnets eligible for discovery by `agent`.
///
/// Subnets with child subnets are skipped; their children are scanned on
/// their own. Every returned subnet has its discovery time stamped before
/// any scanning happens, so a later failure still leaves the stamp in place.
pub async fn select_discoverable(
    store: &dyn InventoryStore,
    tracker: &ScanScheduleTracker,
    agent: AgentId,
    now: DateTime<Utc>,
) -> Result<Vec<Subnet>> {
    let candidates = store.discovery_subnets(agent).await?;
    let mut selected = Vec::with_capacity(candidates.len());

    for subnet in candidates {
        match store.has_child_subnets(subnet.id).await {
            Ok(false) => {}
            Ok(true) => {
                tracing::debug!(subnet_id = %subnet.id, cidr = %subnet.cidr(), "Subnet has children, skipping");
                continue;
            }
            Err(e) => {
                tracing::error!(
                    subnet_id = %subnet.id,
                    cidr = %subnet.cidr(),
                    error = %e,
                    "Could not check subnet delegation, skipping"
                );
                continue;
            }
        }

        tracker.mark_discovery_attempt(subnet.id, now).await;
        selected.push(subnet);
    }

    Ok(selected)
}

/// Devices that answer `kind` and are authorized for the subnet's section.
///
/// An empty result is a configuration gap for this subnet only.
pub async fn select_authorized(
    store: &dyn InventoryStore,
    subnet: &Subnet,
    kind: QueryKind,
) -> Result<Vec<Device>> {
    let devices: Vec<Device> = store
        .devices_with_query(kind)
        .await?
        .into_iter()
        .filter(|d| d.serves_section(subnet.section_id))
        .collect();

    if devices.is_empty() {
        return Err(DiscoverError::NoAuthorizedDevices {
            subnet: subnet.cidr(),
        });
    }

    Ok(devices)
}
