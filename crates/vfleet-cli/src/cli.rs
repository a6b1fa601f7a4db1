//! Command-line arguments.

use crate::config::EnvConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use vfleet_core::{CoreError, ReconcileConfig, RemoteFailurePolicy, DEFAULT_PUBLIC_NETWORK};

pub const DEFAULT_PUB_KEY_FILE: &str = "~/.ssh/id_rsa.pub";

/// Provision a libvirt VM fleet from a declarative document.
#[derive(Parser, Debug)]
#[command(name = "vfleet", version)]
pub struct Cli {
    /// Declarative fleet document (YAML)
    pub input_file: PathBuf,

    /// Virtualization host to provision
    pub target_host: String,

    /// Destroy and recreate resources that already exist
    #[arg(long)]
    pub replace: bool,

    /// SSH public key authorized on the install-server
    #[arg(long, default_value = DEFAULT_PUB_KEY_FILE)]
    pub pub_key_file: String,

    /// Prefix of every created resource (letters and digits)
    #[arg(long, default_value = "default")]
    pub prefix: String,

    /// Public NAT network the install-server gets its lease from
    #[arg(long = "public_network", alias = "public-network", default_value = DEFAULT_PUBLIC_NETWORK)]
    pub public_network: String,

    /// What to do when a remote command fails: ignore, abort or skip-host
    #[arg(
        long,
        value_name = "POLICY",
        default_value_t = RemoteFailurePolicy::Ignore,
        value_parser = parse_failure_policy
    )]
    pub on_remote_failure: RemoteFailurePolicy,

    /// Stop waiting for the install-server lease after this many seconds
    #[arg(long, value_name = "SECS")]
    pub lease_timeout: Option<u64>,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_failure_policy(value: &str) -> Result<RemoteFailurePolicy, String> {
    RemoteFailurePolicy::parse(value)
        .ok_or_else(|| format!("expected ignore, abort or skip-host, got {value:?}"))
}

impl Cli {
    /// Combine the arguments with the environment into a run configuration.
    pub fn reconcile_config(&self, env: &EnvConfig) -> Result<ReconcileConfig, CoreError> {
        let lease_timeout = self
            .lease_timeout
            .map(Duration::from_secs)
            .or(env.lease_timeout);
        ReconcileConfig::builder()
            .target_host(&self.target_host)
            .prefix(&self.prefix)
            .replace(self.replace)
            .public_network(&self.public_network)
            .pub_key_file(expand_home(&self.pub_key_file))
            .remote_failure_policy(self.on_remote_failure)
            .lease_poll_interval(env.lease_poll_interval)
            .lease_timeout(lease_timeout)
            .image_dir(&env.image_dir)
            .emulator(&env.emulator)
            .remote_user(&env.remote_user)
            .build()
    }
}

/// Expand a leading `~/` to `$HOME`.
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}
