//! Reconciliation run configuration.

use crate::error::CoreError;
use crate::naming::{NamingScheme, Prefix};
use std::path::PathBuf;
use std::time::Duration;

/// Default remote directory holding disk and seed images.
pub const DEFAULT_IMAGE_DIR: &str = "/var/lib/libvirt/images";

/// Default emulator binary referenced by domain documents.
pub const DEFAULT_EMULATOR: &str = "/usr/bin/qemu-system-x86_64";

/// Default user for the SSH and control-plane connections.
pub const DEFAULT_REMOTE_USER: &str = "root";

/// Default name of the public NAT network.
pub const DEFAULT_PUBLIC_NETWORK: &str = "nat";

/// What to do when a remote command exits unsuccessfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemoteFailurePolicy {
    /// Log a warning and carry on (default).
    #[default]
    Ignore,
    /// Abort the whole run.
    Abort,
    /// Abandon the current host and continue with the next one.
    SkipHost,
}

impl RemoteFailurePolicy {
    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ignore" => Some(Self::Ignore),
            "abort" => Some(Self::Abort),
            "skip-host" | "skip_host" | "skip" => Some(Self::SkipHost),
            _ => None,
        }
    }
}

impl std::fmt::Display for RemoteFailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Ignore => "ignore",
            Self::Abort => "abort",
            Self::SkipHost => "skip-host",
        })
    }
}

/// Configuration of one reconciliation run.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Virtualization host to reconcile.
    pub target_host: String,
    /// Qualifies every remote resource name.
    pub prefix: Prefix,
    /// Destroy and recreate resources that already exist.
    pub replace: bool,
    /// Name of the public NAT network (default: `nat`).
    pub public_network: String,
    /// SSH public key authorized on the install-server.
    pub pub_key_file: PathBuf,
    pub remote_failure_policy: RemoteFailurePolicy,
    /// Delay between two lease polls (default: 1s).
    pub lease_poll_interval: Duration,
    /// Give up waiting for the install-server lease after this long.
    pub lease_timeout: Option<Duration>,
    /// Remote directory for disk and seed images.
    pub image_dir: String,
    /// Emulator binary on the target host.
    pub emulator: String,
    /// User for SSH and the control-plane connection (default: `root`).
    pub remote_user: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            target_host: String::new(),
            prefix: Prefix::default(),
            replace: false,
            public_network: DEFAULT_PUBLIC_NETWORK.to_string(),
            pub_key_file: PathBuf::new(),
            remote_failure_policy: RemoteFailurePolicy::default(),
            lease_poll_interval: Duration::from_secs(1),
            lease_timeout: None,
            image_dir: DEFAULT_IMAGE_DIR.to_string(),
            emulator: DEFAULT_EMULATOR.to_string(),
            remote_user: DEFAULT_REMOTE_USER.to_string(),
        }
    }
}

impl ReconcileConfig {
    /// Create a new config builder.
    pub fn builder() -> ReconcileConfigBuilder {
        ReconcileConfigBuilder::default()
    }

    /// Naming scheme derived from the prefix and image directory.
    pub fn naming(&self) -> NamingScheme {
        NamingScheme::new(self.prefix.clone(), self.image_dir.clone())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.target_host.trim().is_empty() {
            return Err(CoreError::InvalidConfig("target_host is required".into()));
        }
        if self.public_network.trim().is_empty() {
            return Err(CoreError::InvalidConfig("public_network is required".into()));
        }
        if self.public_network == self.naming().private_network() {
            return Err(CoreError::InvalidConfig(format!(
                "public network {} collides with the private network",
                self.public_network
            )));
        }
        if self.pub_key_file.as_os_str().is_empty() {
            return Err(CoreError::InvalidConfig("pub_key_file is required".into()));
        }
        if self.lease_poll_interval.is_zero() {
            return Err(CoreError::InvalidConfig(
                "lease_poll_interval must be > 0".into(),
            ));
        }
        if self.image_dir.trim().is_empty() {
            return Err(CoreError::InvalidConfig("image_dir is required".into()));
        }
        if self.remote_user.trim().is_empty() {
            return Err(CoreError::InvalidConfig("remote_user is required".into()));
        }
        Ok(())
    }
}

/// Builder for ReconcileConfig.
#[derive(Debug, Default)]
pub struct ReconcileConfigBuilder {
    config: ReconcileConfig,
    prefix: Option<String>,
}

impl ReconcileConfigBuilder {
    pub fn target_host(mut self, host: impl Into<String>) -> Self {
        self.config.target_host = host.into();
        self
    }

    /// Set the run prefix, validated by [`build`](Self::build).
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn replace(mut self, replace: bool) -> Self {
        self.config.replace = replace;
        self
    }

    pub fn public_network(mut self, name: impl Into<String>) -> Self {
        self.config.public_network = name.into();
        self
    }

    pub fn pub_key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pub_key_file = path.into();
        self
    }

    pub fn remote_failure_policy(mut self, policy: RemoteFailurePolicy) -> Self {
        self.config.remote_failure_policy = policy;
        self
    }

    pub fn lease_poll_interval(mut self, interval: Duration) -> Self {
        self.config.lease_poll_interval = interval;
        self
    }

    pub fn lease_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.lease_timeout = timeout;
        self
    }

    pub fn image_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.image_dir = dir.into();
        self
    }

    pub fn emulator(mut self, path: impl Into<String>) -> Self {
        self.config.emulator = path.into();
        self
    }

    pub fn remote_user(mut self, user: impl Into<String>) -> Self {
        self.config.remote_user = user.into();
        self
    }

    /// Build the configuration, validating all required fields.
    pub fn build(mut self) -> Result<ReconcileConfig, CoreError> {
        if let Some(prefix) = self.prefix.take() {
            self.config.prefix = Prefix::new(prefix)?;
        }
        self.config.validate()?;
        Ok(self.config)
    }
}
