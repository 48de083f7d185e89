//! Device query clients.
//!
//! The engine only depends on [`DeviceQueryClient`]. The shipped
//! implementation shells out to net-snmp's `snmpwalk` via
//! `tokio::process::Command` and parses its numeric output.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use tally_core::{Device, DiscoveredEntry, QueryKind};

use crate::error::{DiscoverError, Result};
use crate::snmp_walk;

/// Fetches a device's address-resolution table.
///
/// An empty table is `Ok(vec![])`; transport, protocol, and parse failures
/// are errors.
#[async_trait]
pub trait DeviceQueryClient: Send + Sync {
    async fn query(&self, device: &Device, kind: QueryKind) -> Result<Vec<DiscoveredEntry>>;
}

/// Query `device` with an upper time bound.
///
/// Dropping the inner future on timeout cancels only this device's query.
pub async fn query_with_timeout(
    client: Arc<dyn DeviceQueryClient>,
    device: Device,
    kind: QueryKind,
    limit: Duration,
) -> Result<Vec<DiscoveredEntry>> {
    match tokio::time::timeout(limit, client.query(&device, kind)).await {
        Ok(result) => result,
        Err(_) => Err(DiscoverError::QueryTimeout {
            device: device.hostname.clone(),
            secs: limit.as_secs(),
        }),
    }
}

/// Wrapper around the `snmpwalk` binary.
pub struct SnmpWalkClient {
    snmpwalk_path: String,
    timeout_secs: u64,
}

impl SnmpWalkClient {
    pub fn new(snmpwalk_path: &str, timeout_secs: u64) -> Self {
        Self {
            snmpwalk_path: snmpwalk_path.to_string(),
            timeout_secs: timeout_secs.max(1),
        }
    }

    fn command(&self, device: &Device, oid: &str) -> Command {
        let mut cmd = Command::new(&self.snmpwalk_path);
        cmd.arg("-v")
            .arg(device.snmp_version.as_arg())
            .arg("-c")
            .arg(&device.snmp_community)
            .arg("-On")
            .arg("-t")
            .arg(self.timeout_secs.to_string())
            .arg("-r")
            .arg("1")
            .arg(&device.hostname)
            .arg(oid)
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl DeviceQueryClient for SnmpWalkClient {
    async fn query(&self, device: &Device, kind: QueryKind) -> Result<Vec<DiscoveredEntry>> {
        let failed = |reason: String| DiscoverError::DeviceQuery {
            device: device.hostname.clone(),
            reason,
        };

        let oid = snmp_walk::table_oid(kind)
            .ok_or_else(|| failed(format!("{kind:?} is not a table query")))?;

        let start = Instant::now();
        tracing::debug!(device = %device.hostname, oid, "Starting snmpwalk");

        let output = self
            .command(device, oid)
            .output()
            .await
            .map_err(|e| failed(format!("{}: {e}", self.snmpwalk_path)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(failed(format!(
                "snmpwalk exited with code {}: {stderr}",
                output.status.code().unwrap_or(-1)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let entries = snmp_walk::parse_walk(&stdout, kind)
            .map_err(|e| failed(format!("malformed response, {e}")))?;

        tracing::debug!(
            device = %device.hostname,
            entries = entries.len(),
            duration_ms = start.elapsed().as_millis(),
            "snmpwalk complete"
        );

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{DeviceId, SnmpVersion};

    struct Hanging;

    #[async_trait]
    impl DeviceQueryClient for Hanging {
        async fn query(&self, _device: &Device, _kind: QueryKind) -> Result<Vec<DiscoveredEntry>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    fn device() -> Device {
        Device {
            id: DeviceId(1),
            hostname: "core-sw1".to_string(),
            snmp_version: SnmpVersion::V2c,
            snmp_community: "public".to_string(),
            queries: vec![QueryKind::ArpTable],
            sections: vec![],
        }
    }

    #[tokio::test]
    async fn test_query_timeout() {
        let err = query_with_timeout(
            Arc::new(Hanging),
            device(),
            QueryKind::ArpTable,
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DiscoverError::QueryTimeout { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_device_failure() {
        let client = SnmpWalkClient::new("/nonexistent/snmpwalk", 1);
        let err = client.query(&device(), QueryKind::ArpTable).await.unwrap_err();
        assert!(matches!(err, DiscoverError::DeviceQuery { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_kind_is_device_failure() {
        let client = SnmpWalkClient::new("snmpwalk", 1);
        let err = client
            .query(&device(), QueryKind::Unsupported)
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoverError::DeviceQuery { .. }));
    }
}
