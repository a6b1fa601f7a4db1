//! Control-plane client for networks and domains.
//!
//! The [`ControlPlane`] trait is the only view the reconciler has of the
//! hypervisor. [`VirshControlPlane`] implements it by driving `virsh` against a
//! `qemu+ssh://` connection URI.

use crate::command;
use crate::error::{Result, VirtError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Run state of a domain as reported by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainState {
    NoState,
    Running,
    Blocked,
    Paused,
    ShuttingDown,
    ShutOff,
    Crashed,
    PmSuspended,
}

impl DomainState {
    /// Parse the state string printed by `virsh domstate`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "no state" => Some(Self::NoState),
            "running" => Some(Self::Running),
            "idle" | "blocked" => Some(Self::Blocked),
            "paused" => Some(Self::Paused),
            "in shutdown" => Some(Self::ShuttingDown),
            "shut off" => Some(Self::ShutOff),
            "crashed" => Some(Self::Crashed),
            "pmsuspended" => Some(Self::PmSuspended),
            _ => None,
        }
    }

    /// Whether the domain has a live process that must be destroyed first.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Running | Self::Blocked | Self::Paused | Self::ShuttingDown | Self::PmSuspended
        )
    }
}

impl std::fmt::Display for DomainState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NoState => "no state",
            Self::Running => "running",
            Self::Blocked => "blocked",
            Self::Paused => "paused",
            Self::ShuttingDown => "in shutdown",
            Self::ShutOff => "shut off",
            Self::Crashed => "crashed",
            Self::PmSuspended => "pmsuspended",
        };
        f.write_str(s)
    }
}

/// A network known to the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkHandle {
    pub name: String,
    pub uuid: String,
}

/// A domain known to the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainHandle {
    pub name: String,
    pub uuid: String,
}

/// A DHCP lease handed out by a virtual network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpLease {
    /// MAC address of the client, lower case.
    pub mac: String,
    /// Leased address, without prefix length.
    pub ipaddr: String,
    /// Client-supplied hostname, if any.
    pub hostname: Option<String>,
}

/// A network interface of a defined domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainInterface {
    /// Network the interface is attached to.
    pub source: String,
    /// MAC address, lower case.
    pub mac: String,
}

/// Operations the reconciler needs from the virtualization control plane.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Names of all networks, active or not.
    async fn list_networks(&self) -> Result<Vec<String>>;

    /// Names of all domains, running or not.
    async fn list_domains(&self) -> Result<Vec<String>>;

    async fn lookup_network(&self, name: &str) -> Result<NetworkHandle>;

    async fn lookup_domain(&self, name: &str) -> Result<DomainHandle>;

    async fn domain_state(&self, domain: &DomainHandle) -> Result<DomainState>;

    /// Hard-stop a running domain.
    async fn destroy_domain(&self, domain: &DomainHandle) -> Result<()>;

    /// Remove a stopped domain's definition.
    async fn undefine_domain(&self, domain: &DomainHandle) -> Result<()>;

    async fn destroy_network(&self, network: &NetworkHandle) -> Result<()>;

    /// Define and activate a network from its XML document.
    async fn create_network(&self, xml: &str) -> Result<()>;

    /// Define (but do not start) a domain from its XML document.
    async fn define_domain(&self, xml: &str) -> Result<()>;

    async fn start_domain(&self, domain: &DomainHandle) -> Result<()>;

    /// Current DHCP leases of a network.
    async fn dhcp_leases(&self, network: &NetworkHandle) -> Result<Vec<DhcpLease>>;

    /// Interfaces declared by a domain, running or not.
    async fn domain_interfaces(&self, domain: &DomainHandle) -> Result<Vec<DomainInterface>>;
}

/// [`ControlPlane`] implementation driving the `virsh` binary.
#[derive(Debug, Clone)]
pub struct VirshControlPlane {
    uri: String,
}

impl VirshControlPlane {
    /// Connect to the system libvirt daemon of `host` over SSH as `user`.
    pub fn new(user: &str, host: &str) -> Self {
        Self::with_uri(format!("qemu+ssh://{user}@{host}/system"))
    }

    /// Use an explicit libvirt connection URI.
    pub fn with_uri(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    fn args(&self, args: &[&str]) -> Vec<String> {
        let mut full = vec!["-c".to_string(), self.uri.clone()];
        full.extend(args.iter().map(|a| a.to_string()));
        full
    }

    async fn virsh(&self, args: &[&str]) -> Result<String> {
        command::checked_stdout("virsh", &self.args(args)).await
    }

    /// Run a virsh subcommand that takes a document file.
    async fn virsh_with_document(&self, subcommand: &str, xml: &str) -> Result<String> {
        let mut file = tempfile::Builder::new()
            .prefix("vfleet-")
            .suffix(".xml")
            .tempfile()?;
        file.write_all(xml.as_bytes())?;
        file.flush()?;
        let path = file.path().to_string_lossy().to_string();
        // the temp file must outlive the virsh process
        let out = self.virsh(&[subcommand, &path]).await;
        drop(file);
        out
    }
}

#[async_trait]
impl ControlPlane for VirshControlPlane {
    async fn list_networks(&self) -> Result<Vec<String>> {
        Ok(parse_name_list(&self.virsh(&["net-list", "--all", "--name"]).await?))
    }

    async fn list_domains(&self) -> Result<Vec<String>> {
        Ok(parse_name_list(&self.virsh(&["list", "--all", "--name"]).await?))
    }

    async fn lookup_network(&self, name: &str) -> Result<NetworkHandle> {
        let uuid = self.virsh(&["net-uuid", name]).await.map_err(|e| match e {
            VirtError::Command { .. } => VirtError::NotFound {
                kind: "network",
                name: name.to_string(),
            },
            other => other,
        })?;
        Ok(NetworkHandle {
            name: name.to_string(),
            uuid: uuid.trim().to_string(),
        })
    }

    async fn lookup_domain(&self, name: &str) -> Result<DomainHandle> {
        let uuid = self.virsh(&["domuuid", name]).await.map_err(|e| match e {
            VirtError::Command { .. } => VirtError::NotFound {
                kind: "domain",
                name: name.to_string(),
            },
            other => other,
        })?;
        Ok(DomainHandle {
            name: name.to_string(),
            uuid: uuid.trim().to_string(),
        })
    }

    async fn domain_state(&self, domain: &DomainHandle) -> Result<DomainState> {
        let out = self.virsh(&["domstate", &domain.name]).await?;
        DomainState::parse(&out).ok_or_else(|| VirtError::Parse {
            what: "domain state",
            detail: out.trim().to_string(),
        })
    }

    async fn destroy_domain(&self, domain: &DomainHandle) -> Result<()> {
        self.virsh(&["destroy", &domain.name]).await.map(|_| ())
    }

    async fn undefine_domain(&self, domain: &DomainHandle) -> Result<()> {
        self.virsh(&["undefine", &domain.name]).await.map(|_| ())
    }

    async fn destroy_network(&self, network: &NetworkHandle) -> Result<()> {
        self.virsh(&["net-destroy", &network.name]).await.map(|_| ())
    }

    async fn create_network(&self, xml: &str) -> Result<()> {
        self.virsh_with_document("net-create", xml).await.map(|_| ())
    }

    async fn define_domain(&self, xml: &str) -> Result<()> {
        self.virsh_with_document("define", xml).await.map(|_| ())
    }

    async fn start_domain(&self, domain: &DomainHandle) -> Result<()> {
        self.virsh(&["start", &domain.name]).await.map(|_| ())
    }

    async fn dhcp_leases(&self, network: &NetworkHandle) -> Result<Vec<DhcpLease>> {
        let out = self.virsh(&["net-dhcp-leases", &network.name]).await?;
        parse_dhcp_leases(&out)
    }

    async fn domain_interfaces(&self, domain: &DomainHandle) -> Result<Vec<DomainInterface>> {
        let out = self.virsh(&["domiflist", &domain.name]).await?;
        parse_domain_interfaces(&out)
    }
}

/// Parse the one-name-per-line output of `--name` listings.
pub fn parse_name_list(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Parse the table printed by `virsh net-dhcp-leases`.
///
/// ```text
///  Expiry Time           MAC address         Protocol   IP address          Hostname   Client ID or DUID
/// ------------------------------------------------------------------------------------------------------
///  2015-06-01 10:00:00   52:54:00:01:02:03   ipv4       192.168.140.12/24   router     -
/// ```
pub fn parse_dhcp_leases(out: &str) -> Result<Vec<DhcpLease>> {
    let mut leases = Vec::new();
    let mut in_body = false;
    for line in out.lines() {
        let line = line.trim();
        if !in_body {
            in_body = line.starts_with("---");
            continue;
        }
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 {
            return Err(VirtError::Parse {
                what: "DHCP lease",
                detail: line.to_string(),
            });
        }
        let ipaddr = fields[4].split('/').next().unwrap_or(fields[4]);
        let hostname = fields
            .get(5)
            .filter(|h| **h != "-")
            .map(|h| h.to_string());
        leases.push(DhcpLease {
            mac: fields[2].to_lowercase(),
            ipaddr: ipaddr.to_string(),
            hostname,
        });
    }
    Ok(leases)
}

/// Parse the table printed by `virsh domiflist`.
///
/// ```text
///  Interface   Type      Source   Model    MAC
/// -----------------------------------------------------------
///  vnet0       network   t1_sps   virtio   52:54:00:0a:0b:0c
///  -           network   nat      virtio   52:54:00:0a:0b:0d
/// ```
pub fn parse_domain_interfaces(out: &str) -> Result<Vec<DomainInterface>> {
    let mut interfaces = Vec::new();
    let mut in_body = false;
    for line in out.lines() {
        let line = line.trim();
        if !in_body {
            in_body = line.starts_with("---");
            continue;
        }
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 {
            return Err(VirtError::Parse {
                what: "domain interface",
                detail: line.to_string(),
            });
        }
        interfaces.push(DomainInterface {
            source: fields[2].to_string(),
            mac: fields[4].to_lowercase(),
        });
    }
    Ok(interfaces)
}
