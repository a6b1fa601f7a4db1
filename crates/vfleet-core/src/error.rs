//! Error types for vfleet-core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for vfleet-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur during a reconciliation run.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Error from the control plane or the remote channel
    #[error("virt error: {0}")]
    Virt(#[from] vfleet_virt::VirtError),

    /// The document declares no host with the install-server profile
    #[error("no host with profile 'install-server' found")]
    MissingInstallServer,

    /// The document declares more than one install-server
    #[error("more than one install-server host declared: {}", .0.join(", "))]
    MultipleInstallServers(Vec<String>),

    /// Prefix contains characters other than ASCII letters and digits
    #[error("invalid prefix {0:?}: only ASCII letters and digits are allowed")]
    InvalidPrefix(String),

    /// SSH public key file could not be read
    #[error("cannot read SSH public key {path}: {source}")]
    MissingPubKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Document is structurally valid but semantically wrong
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Run configuration is inconsistent
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A remote command exited unsuccessfully
    #[error("remote command failed on host {host}: `{command}` ({status}): {stderr}")]
    RemoteCommandFailed {
        /// Declared hostname the command was run for
        host: String,
        /// The command line
        command: String,
        /// Exit status description
        status: String,
        /// Trailing stderr of the command
        stderr: String,
    },

    /// Template rendering error
    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    /// Input document could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The existing install-server has no interface on the public network
    #[error("domain {domain} has no interface on network {network}")]
    NoPublicInterface { domain: String, network: String },

    /// The install-server did not obtain a lease in time
    #[error("no DHCP lease for the install-server after {0:?}")]
    LeaseTimeout(std::time::Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Whether the error was detected before anything was changed remotely.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::MissingInstallServer
                | Self::MultipleInstallServers(_)
                | Self::InvalidPrefix(_)
                | Self::MissingPubKey { .. }
                | Self::InvalidDocument(_)
                | Self::InvalidConfig(_)
                | Self::Yaml(_)
        )
    }
}
