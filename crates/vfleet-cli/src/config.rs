//! Ambient settings read from the environment.

use std::time::Duration;
use vfleet_core::{DEFAULT_EMULATOR, DEFAULT_IMAGE_DIR, DEFAULT_REMOTE_USER};

/// Settings that rarely change between runs on the same machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    /// Remote directory holding disk and seed images.
    pub image_dir: String,
    /// Emulator binary on the target host.
    pub emulator: String,
    /// User for SSH and the control-plane connection.
    pub remote_user: String,
    /// Give up waiting for the install-server lease after this long.
    pub lease_timeout: Option<Duration>,
    /// Delay between two lease polls.
    pub lease_poll_interval: Duration,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            image_dir: DEFAULT_IMAGE_DIR.to_string(),
            emulator: DEFAULT_EMULATOR.to_string(),
            remote_user: DEFAULT_REMOTE_USER.to_string(),
            lease_timeout: None,
            lease_poll_interval: Duration::from_secs(1),
        }
    }
}

impl EnvConfig {
    /// Load settings from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `VFLEET_IMAGE_DIR` | `/var/lib/libvirt/images` |
    /// | `VFLEET_EMULATOR` | `/usr/bin/qemu-system-x86_64` |
    /// | `VFLEET_REMOTE_USER` | `root` |
    /// | `VFLEET_LEASE_TIMEOUT_SECS` | unset (wait forever) |
    /// | `VFLEET_LEASE_POLL_MILLIS` | `1000` |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();

        Self {
            image_dir: lookup("VFLEET_IMAGE_DIR").unwrap_or(default.image_dir),
            emulator: lookup("VFLEET_EMULATOR").unwrap_or(default.emulator),
            remote_user: lookup("VFLEET_REMOTE_USER").unwrap_or(default.remote_user),
            lease_timeout: lookup("VFLEET_LEASE_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs),
            lease_poll_interval: lookup("VFLEET_LEASE_POLL_MILLIS")
                .and_then(|v| v.parse().ok())
                .filter(|ms: &u64| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(default.lease_poll_interval),
        }
    }
}
