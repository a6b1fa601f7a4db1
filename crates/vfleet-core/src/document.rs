//! Declarative description of the fleet.
//!
//! The document is read once at startup. Unknown keys are ignored so that the
//! richer files produced by the inventory collector load unchanged.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Profile value that marks the install-server host.
pub const INSTALL_SERVER_PROFILE: &str = "install-server";

/// Default guest memory in KiB (4 GiB).
pub const DEFAULT_MEMORY_KIB: u64 = 4_194_304;

/// Default number of virtual CPUs.
pub const DEFAULT_NCPUS: u32 = 1;

/// Root of the input document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeclarativeDocument {
    /// Platform version, selects the install-server base image.
    #[serde(default)]
    pub version: Option<String>,
    /// Hosts keyed by hostname. Iteration order is lexicographic.
    #[serde(default)]
    pub hosts: BTreeMap<String, HostSpec>,
}

/// One guest to provision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostSpec {
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub disks: Vec<DiskSpec>,
    #[serde(default)]
    pub nics: Vec<NicSpec>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    /// Memory in KiB.
    #[serde(default)]
    pub memory: Option<u64>,
    #[serde(default)]
    pub ncpus: Option<u32>,
}

impl HostSpec {
    pub fn is_install_server(&self) -> bool {
        self.profile == INSTALL_SERVER_PROFILE
    }
}

/// A disk attached to a guest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskSpec {
    /// Size with unit suffix, e.g. `30G` or `15Gi`.
    pub size: String,
    /// Base image to clone instead of allocating an empty disk.
    #[serde(default)]
    pub clone_from: Option<String>,
}

/// A network interface attached to a guest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NicSpec {
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub network_name: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub netmask: Option<String>,
    #[serde(default)]
    pub gateway: Option<String>,
}

impl DeclarativeDocument {
    /// Parse a document from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let doc: Self = serde_yaml::from_str(text)?;
        doc.validate()?;
        Ok(doc)
    }

    /// Read and parse a document file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), bytes = text.len(), "Read input document");
        Self::from_yaml_str(&text)
    }

    /// Hostnames declaring the install-server profile, in lexicographic order.
    pub fn install_server_hosts(&self) -> Vec<&str> {
        self.hosts
            .iter()
            .filter(|(_, spec)| spec.is_install_server())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    fn validate(&self) -> Result<()> {
        for (hostname, spec) in &self.hosts {
            if hostname.is_empty() {
                return Err(CoreError::InvalidDocument("empty hostname".into()));
            }
            // Hostnames end up in remote paths and shell arguments.
            if !hostname
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            {
                return Err(CoreError::InvalidDocument(format!(
                    "invalid hostname {hostname:?}: only ASCII letters, digits, '.', '_' and '-' are allowed"
                )));
            }
            if let Some(disk) = spec.disks.iter().find(|d| d.size.trim().is_empty()) {
                return Err(CoreError::InvalidDocument(format!(
                    "host {hostname}: disk without size ({disk:?})"
                )));
            }
            if spec.memory == Some(0) || spec.ncpus == Some(0) {
                return Err(CoreError::InvalidDocument(format!(
                    "host {hostname}: memory and ncpus must be > 0"
                )));
            }
        }
        Ok(())
    }
}
