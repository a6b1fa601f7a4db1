//! Facts about the install-server derived from the document.

use crate::document::{DeclarativeDocument, NicSpec};
use crate::error::{CoreError, Result};
use crate::util::random_mac;
use serde::Serialize;
use std::net::Ipv4Addr;

/// Platform version assumed when the document does not declare one.
pub const DEFAULT_VERSION: &str = "RH7.0-I.1.2.1";

/// Install-server facts, computed once per run from its first (admin) NIC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallServerInfo {
    pub hostname: String,
    /// MAC given to the install-server's public NIC when it is created.
    /// Random unless the admin NIC declares one.
    pub mac: String,
    pub ip: String,
    pub network: String,
    pub netmask: String,
    /// First address of the admin network.
    pub gateway: String,
    pub version: String,
}

impl InstallServerInfo {
    /// Derive the install-server facts.
    ///
    /// # Errors
    ///
    /// Fails unless exactly one host has the install-server profile, or when
    /// its admin NIC does not describe a valid IPv4 network.
    pub fn from_document(doc: &DeclarativeDocument) -> Result<Self> {
        let hostname = match doc.install_server_hosts().as_slice() {
            [] => return Err(CoreError::MissingInstallServer),
            [one] => one.to_string(),
            many => {
                return Err(CoreError::MultipleInstallServers(
                    many.iter().map(|s| s.to_string()).collect(),
                ))
            }
        };
        tracing::info!(%hostname, "Found install-server");

        let spec = &doc.hosts[&hostname];
        let admin = spec.nics.first().ok_or_else(|| {
            CoreError::InvalidDocument(format!("install-server {hostname} has no NIC"))
        })?;
        let net = AdminNetwork::from_nic(admin)
            .map_err(|e| CoreError::InvalidDocument(format!("install-server {hostname}: {e}")))?;

        Ok(Self {
            mac: admin.mac.clone().unwrap_or_else(random_mac),
            ip: net.ip.to_string(),
            network: net.network.to_string(),
            netmask: net.netmask.to_string(),
            gateway: net.gateway().to_string(),
            version: doc
                .version
                .clone()
                .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            hostname,
        })
    }
}

/// IPv4 addressing of the install-server's admin NIC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminNetwork {
    pub ip: Ipv4Addr,
    pub network: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

impl AdminNetwork {
    /// Read the addressing of a NIC.
    ///
    /// `network` and `netmask` are taken as declared; the netmask may be
    /// dotted (`255.255.255.0`) or a prefix length (`24`). When both are
    /// missing, `ip` must carry a prefix length (`10.0.0.1/24`).
    pub fn from_nic(nic: &NicSpec) -> std::result::Result<Self, String> {
        let raw_ip = nic.ip.as_deref().ok_or("admin NIC has no ip")?;
        let (ip_part, ip_prefix) = match raw_ip.split_once('/') {
            Some((ip, prefix)) => (ip, Some(prefix)),
            None => (raw_ip, None),
        };
        let ip: Ipv4Addr = ip_part
            .parse()
            .map_err(|e| format!("invalid ip {raw_ip:?}: {e}"))?;

        let netmask = match (nic.netmask.as_deref(), ip_prefix) {
            (Some(mask), _) => parse_netmask(mask)?,
            (None, Some(prefix)) => parse_netmask(prefix)?,
            (None, None) => return Err("admin NIC has no netmask".to_string()),
        };

        let network = match nic.network.as_deref() {
            Some(network) => {
                let network: Ipv4Addr = network
                    .parse()
                    .map_err(|e| format!("invalid network {network:?}: {e}"))?;
                if u32::from(network) & !u32::from(netmask) != 0 {
                    return Err(format!("{network}/{netmask} has host bits set"));
                }
                network
            }
            None => Ipv4Addr::from(u32::from(ip) & u32::from(netmask)),
        };

        Ok(Self {
            ip,
            network,
            netmask,
        })
    }

    /// The network address plus one.
    pub fn gateway(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network).wrapping_add(1))
    }
}

/// Parse a dotted netmask or a prefix length into a dotted netmask.
fn parse_netmask(value: &str) -> std::result::Result<Ipv4Addr, String> {
    if let Ok(len) = value.parse::<u8>() {
        if len > 32 {
            return Err(format!("prefix length {len} exceeds 32"));
        }
        let bits = if len == 0 { 0 } else { u32::MAX << (32 - len) };
        return Ok(Ipv4Addr::from(bits));
    }
    let mask: Ipv4Addr = value
        .parse()
        .map_err(|e| format!("invalid netmask {value:?}: {e}"))?;
    let bits = u32::from(mask);
    if bits.leading_ones() + bits.trailing_zeros() != 32 {
        return Err(format!("netmask {mask} is not contiguous"));
    }
    Ok(mask)
}
