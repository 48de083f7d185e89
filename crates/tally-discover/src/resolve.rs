//! DNS reconciliation: reverse-resolve addresses and write hostnames back.
//!
//! Each address is resolved through the nameserver set configured on its
//! subnet. Only a successful resolution produces a write; anything else is
//! left for the next run.

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;

use tally_core::address::{self, Family};
use tally_core::{AgentId, NameserverId, Subnet, SubnetId};
use tally_store::{InventoryStore, ResolveScope};

use crate::config::NameserverSet;
use crate::error::{DiscoverError, Result};

/// Result of one reverse lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(String),
    Unresolved,
    Error(String),
}

#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, address: IpAddr, nameserver: Option<NameserverId>) -> Resolution;
}

/// Reverse resolver backed by hickory, one resolver per nameserver set.
pub struct HickoryResolver {
    system: TokioAsyncResolver,
    sets: HashMap<NameserverId, TokioAsyncResolver>,
}

impl HickoryResolver {
    /// Build resolvers for the configured sets; unknown or absent set ids fall
    /// back to the system configuration.
    pub fn new(sets: &[NameserverSet]) -> Result<Self> {
        let system = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| DiscoverError::Config(format!("system resolver: {e}")))?;

        let sets = sets
            .iter()
            .filter(|set| !set.servers.is_empty())
            .map(|set| {
                let group = NameServerConfigGroup::from_ips_clear(&set.servers, 53, true);
                let config = ResolverConfig::from_parts(None, vec![], group);
                (set.id, TokioAsyncResolver::tokio(config, ResolverOpts::default()))
            })
            .collect();

        Ok(Self { system, sets })
    }

    fn resolver_for(&self, nameserver: Option<NameserverId>) -> &TokioAsyncResolver {
        nameserver
            .and_then(|id| self.sets.get(&id))
            .unwrap_or(&self.system)
    }
}

#[async_trait]
impl Resolver for HickoryResolver {
    async fn resolve(&self, address: IpAddr, nameserver: Option<NameserverId>) -> Resolution {
        match self.resolver_for(nameserver).reverse_lookup(address).await {
            Ok(lookup) => match lookup.iter().next() {
                Some(name) => Resolution::Resolved(name.to_string().trim_end_matches('.').to_string()),
                None => Resolution::Unresolved,
            },
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => Resolution::Unresolved,
                _ => Resolution::Error(e.to_string()),
            },
        }
    }
}

/// Outcome of one DNS reconciliation pass.
#[derive(Debug, Default)]
pub struct ResolveReport {
    pub examined: usize,
    /// `(address, hostname)` pairs written back.
    pub updated: Vec<(String, String)>,
    pub unchanged: usize,
    pub unresolved: usize,
    /// Lookups that failed outright (timeouts, server errors).
    pub errors: usize,
    /// Hostname writes the store rejected.
    pub failed: usize,
}

impl ResolveReport {
    /// Lines for verbose output.
    pub fn render(&self) -> String {
        self.updated
            .iter()
            .map(|(ip, name)| format!("updated ip address {ip} with hostname {name}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Which addresses a DNS pass covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveTarget {
    /// Subnets with DNS resolution enabled and owned by this agent, or every
    /// address when the agent owns none.
    Agent(AgentId),
    /// Every address in the inventory.
    Global,
}

/// Resolve the working set and write back new hostnames.
///
/// Only reading the working set can fail the pass; per-address failures are
/// logged and skipped.
pub async fn run_resolve_pass(
    store: &dyn InventoryStore,
    resolver: &dyn Resolver,
    target: ResolveTarget,
    empty_only: bool,
) -> Result<ResolveReport> {
    let scope = match target {
        ResolveTarget::Global => ResolveScope::All,
        ResolveTarget::Agent(agent) => {
            let ids: Vec<SubnetId> = store
                .resolve_subnets(agent)
                .await?
                .into_iter()
                .map(|s| s.id)
                .collect();
            if ids.is_empty() {
                tracing::info!(agent_id = %agent, "No subnets marked for DNS resolution, resolving all addresses");
                ResolveScope::All
            } else {
                ResolveScope::Subnets(ids)
            }
        }
    };

    let addresses = store.addresses_for_resolve(&scope, empty_only).await?;
    tracing::info!(count = addresses.len(), empty_only, "Resolving addresses");

    let mut subnets: HashMap<SubnetId, Option<Subnet>> = HashMap::new();
    let mut report = ResolveReport::default();

    for record in addresses {
        report.examined += 1;

        if !subnets.contains_key(&record.subnet_id) {
            let subnet = match store.subnet(record.subnet_id).await {
                Ok(subnet) => subnet,
                Err(e) => {
                    tracing::warn!(subnet_id = %record.subnet_id, error = %e, "Could not load subnet");
                    None
                }
            };
            subnets.insert(record.subnet_id, subnet);
        }
        let subnet = subnets.get(&record.subnet_id).and_then(|s| s.as_ref());
        let nameserver = subnet.and_then(|s| s.nameserver_id);
        let ip = match subnet {
            Some(s) => address::to_ip_in(record.address, Family::of(&s.network)),
            None => address::to_ip(record.address),
        };

        let hostname = match resolver.resolve(ip, nameserver).await {
            Resolution::Resolved(name) => name,
            Resolution::Unresolved => {
                report.unresolved += 1;
                tracing::debug!(address = %ip, "No PTR record");
                continue;
            }
            Resolution::Error(reason) => {
                report.errors += 1;
                let e = DiscoverError::Resolution {
                    address: ip.to_string(),
                    reason,
                };
                tracing::debug!(error = %e, "Skipping address");
                continue;
            }
        };

        if record.hostname.as_deref() == Some(hostname.as_str()) {
            report.unchanged += 1;
            continue;
        }

        match store.update_hostname(record.id, &hostname).await {
            Ok(()) => {
                tracing::info!(address = %ip, hostname = %hostname, "Hostname updated");
                report.updated.push((ip.to_string(), hostname));
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(address = %ip, error = %e, "Failed to update address");
            }
        }
    }

    Ok(report)
}
