//! Waiting for the install-server's DHCP lease.

use crate::error::{CoreError, Result};
use std::time::Duration;
use vfleet_virt::{ControlPlane, DhcpLease, NetworkHandle};

/// Poll the lease table of `network` until an entry for `mac` appears.
///
/// Sleeps `interval` between polls on the tokio clock. Without a `timeout`
/// the wait only ends when a lease shows up or the future is dropped.
pub async fn wait_for_lease(
    control: &dyn ControlPlane,
    network: &NetworkHandle,
    mac: &str,
    interval: Duration,
    timeout: Option<Duration>,
) -> Result<DhcpLease> {
    let poll = poll_leases(control, network, mac, interval);
    match timeout {
        Some(limit) => tokio::time::timeout(limit, poll)
            .await
            .map_err(|_| CoreError::LeaseTimeout(limit))?,
        None => poll.await,
    }
}

async fn poll_leases(
    control: &dyn ControlPlane,
    network: &NetworkHandle,
    mac: &str,
    interval: Duration,
) -> Result<DhcpLease> {
    let mac = mac.to_ascii_lowercase();
    tracing::info!(network = %network.name, %mac, "Waiting for install-server lease");
    let mut attempts: u64 = 0;
    loop {
        attempts += 1;
        let leases = control.dhcp_leases(network).await?;
        if let Some(lease) = leases.into_iter().find(|l| l.mac.eq_ignore_ascii_case(&mac)) {
            tracing::info!(ip = %lease.ipaddr, attempts, "Install-server obtained a lease");
            return Ok(lease);
        }
        tracing::trace!(attempts, "No lease yet");
        tokio::time::sleep(interval).await;
    }
}
