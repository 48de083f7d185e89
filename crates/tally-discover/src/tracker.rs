//! Scan bookkeeping timestamps.
//!
//! Best effort: a failed write is logged and never interrupts a pass.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tally_core::{AgentId, SubnetId};
use tally_store::InventoryStore;

#[derive(Clone)]
pub struct ScanScheduleTracker {
    store: Arc<dyn InventoryStore>,
}

impl ScanScheduleTracker {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    /// Stamp that discovery was attempted for `subnet`. Returns whether the
    /// stamp was written.
    pub async fn mark_discovery_attempt(&self, subnet: SubnetId, at: DateTime<Utc>) -> bool {
        match self.store.mark_subnet_discovered(subnet, at).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(subnet_id = %subnet, error = %e, "Failed to record discovery time");
                false
            }
        }
    }

    pub async fn mark_scan_complete(&self, subnet: SubnetId, at: DateTime<Utc>) -> bool {
        match self.store.mark_subnet_scanned(subnet, at).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(subnet_id = %subnet, error = %e, "Failed to record scan time");
                false
            }
        }
    }

    pub async fn mark_agent_checked(&self, agent: AgentId, at: DateTime<Utc>) -> bool {
        match self.store.mark_agent_checked(agent, at).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(agent_id = %agent, error = %e, "Failed to record agent check time");
                false
            }
        }
    }
}
