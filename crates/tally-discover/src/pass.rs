//! Discovery pass orchestration.
//!
//! Spawns one tokio task per eligible subnet, bounded by a semaphore. A
//! subnet's failure is logged and recorded; it never stops its siblings. The
//! agent check-in time is stamped once, after every subnet task has finished.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use uuid::Uuid;

use tally_core::{AgentId, SubnetId};
use tally_store::InventoryStore;

use crate::config::DiscoverConfig;
use crate::error::Result;
use crate::query::DeviceQueryClient;
use crate::reconcile::{self, ReconcileContext, SubnetReport};
use crate::select;
use crate::summary::ChangeSummary;
use crate::tracker::ScanScheduleTracker;

/// How a discovery pass ended.
#[derive(Debug)]
pub enum PassOutcome {
    /// Discovery is switched off in configuration.
    Disabled,
    /// No subnet qualified for this agent.
    NothingToScan,
    Completed(PassReport),
}

/// A subnet whose pass could not proceed.
#[derive(Debug, Clone)]
pub struct SubnetFailure {
    pub subnet_id: SubnetId,
    pub cidr: String,
    pub error: String,
}

#[derive(Debug)]
pub struct PassReport {
    pub pass_id: Uuid,
    pub agent: AgentId,
    pub started_at: DateTime<Utc>,
    pub subnets: Vec<SubnetReport>,
    pub failures: Vec<SubnetFailure>,
}

impl PassReport {
    pub fn change_summary(&self) -> ChangeSummary {
        ChangeSummary {
            changes: self
                .subnets
                .iter()
                .flat_map(|s| s.changes.iter().cloned())
                .collect(),
        }
    }
}

/// Runs discovery passes for one store and device query client.
pub struct DiscoveryPass {
    config: DiscoverConfig,
    store: Arc<dyn InventoryStore>,
    client: Arc<dyn DeviceQueryClient>,
}

impl DiscoveryPass {
    pub fn new(
        config: DiscoverConfig,
        store: Arc<dyn InventoryStore>,
        client: Arc<dyn DeviceQueryClient>,
    ) -> Self {
        Self {
            config,
            store,
            client,
        }
    }

    /// Run one pass for `agent`, stamping everything with the current time.
    pub async fn run(&self, agent: AgentId) -> Result<PassOutcome> {
        self.run_at(agent, Utc::now()).await
    }

    /// Run one pass with an explicit pass time.
    pub async fn run_at(&self, agent: AgentId, now: DateTime<Utc>) -> Result<PassOutcome> {
        let Some(kind) = self.config.check_method.query_kind() else {
            tracing::warn!("Scanning disabled (check_method = none)");
            return Ok(PassOutcome::Disabled);
        };

        let pass_id = Uuid::new_v4();
        let tracker = ScanScheduleTracker::new(Arc::clone(&self.store));

        tracing::info!(pass_id = %pass_id, agent_id = %agent, method = ?kind, "Fetching subnets");

        let subnets =
            select::select_discoverable(self.store.as_ref(), &tracker, agent, now).await?;
        if subnets.is_empty() {
            tracing::info!(pass_id = %pass_id, agent_id = %agent, "No subnets are marked for new hosts checking");
            return Ok(PassOutcome::NothingToScan);
        }

        let ctx = Arc::new(ReconcileContext {
            store: Arc::clone(&self.store),
            client: Arc::clone(&self.client),
            tracker: tracker.clone(),
            kind,
            query_timeout: self.config.query_timeout(),
            max_concurrent_queries: self.config.max_concurrent_queries,
            seen_at: now,
        });
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_subnets.max(1)));

        let mut handles = Vec::with_capacity(subnets.len());
        for subnet in subnets {
            let ctx = Arc::clone(&ctx);
            let semaphore = Arc::clone(&semaphore);
            let id = subnet.id;
            let cidr = subnet.cidr();

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                reconcile::reconcile_subnet(&ctx, &subnet).await
            });
            handles.push((id, cidr, handle));
        }

        tracing::info!(pass_id = %pass_id, subnet_count = handles.len(), "Subnet scans started");

        let mut reports = Vec::new();
        let mut failures = Vec::new();
        for (subnet_id, cidr, handle) in handles {
            let error = match handle.await {
                Ok(Ok(report)) => {
                    reports.push(report);
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(e) => format!("subnet task panicked: {e}"),
            };
            tracing::error!(
                pass_id = %pass_id,
                subnet_id = %subnet_id,
                cidr = %cidr,
                error = %error,
                "Subnet scan failed"
            );
            failures.push(SubnetFailure {
                subnet_id,
                cidr,
                error,
            });
        }

        tracker.mark_agent_checked(agent, now).await;

        tracing::info!(
            pass_id = %pass_id,
            agent_id = %agent,
            scanned = reports.len(),
            failed = failures.len(),
            "Discovery pass complete"
        );

        Ok(PassOutcome::Completed(PassReport {
            pass_id,
            agent,
            started_at: now,
            subnets: reports,
            failures,
        }))
    }
}
