//! Resource naming.
//!
//! Every remote resource a run creates is qualified by the run prefix, so that
//! independent runs with different prefixes can share one host. All names and
//! remote paths are derived here and nowhere else.

use crate::error::{CoreError, Result};
use std::fmt;

/// A validated run prefix: one or more ASCII letters or digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Prefix(String);

impl Prefix {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::InvalidPrefix(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Prefix {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Prefix {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Derives resource names and remote paths for one run.
#[derive(Debug, Clone)]
pub struct NamingScheme {
    prefix: Prefix,
    image_dir: String,
}

impl NamingScheme {
    pub fn new(prefix: Prefix, image_dir: impl Into<String>) -> Self {
        let image_dir: String = image_dir.into();
        Self {
            prefix,
            image_dir: image_dir.trim_end_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    pub fn image_dir(&self) -> &str {
        &self.image_dir
    }

    /// Domain name of a declared host: `<prefix>_<hostname>`.
    pub fn domain(&self, hostname: &str) -> String {
        format!("{}_{}", self.prefix, hostname)
    }

    /// The run's private network, used by NICs without an explicit network.
    pub fn private_network(&self) -> String {
        format!("{}_sps", self.prefix)
    }

    /// Remote path of the `index`-th disk of a domain.
    pub fn disk_path(&self, domain: &str, index: usize) -> String {
        format!("{}/{}-{:03}.qcow2", self.image_dir, domain, index)
    }

    /// Remote path of the install-server base image for a platform version.
    pub fn install_server_image(&self, version: &str) -> String {
        format!("{}/install-server-{}.img.qcow2", self.image_dir, version)
    }

    /// Remote scratch directory holding the seed documents of a domain.
    pub fn seed_dir(&self, domain: &str) -> String {
        format!("/tmp/{domain}_data")
    }

    /// Remote path of the seed image of a domain.
    pub fn seed_image(&self, domain: &str) -> String {
        format!("{}/{}_cloud-init.iso", self.image_dir, domain)
    }
}
