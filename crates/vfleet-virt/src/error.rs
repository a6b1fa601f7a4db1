//! Error types for vfleet-virt.

use thiserror::Error;

/// Result type alias for vfleet-virt operations.
pub type Result<T> = std::result::Result<T, VirtError>;

/// Errors that can occur while talking to the control plane or the remote host.
#[derive(Debug, Error)]
pub enum VirtError {
    /// A local helper process (virsh, ssh, scp) could not be spawned
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A control-plane command exited unsuccessfully
    #[error("{command} failed: {stderr}")]
    Command { command: String, stderr: String },

    /// Unexpected output from the control plane
    #[error("failed to parse {what}: {detail}")]
    Parse { what: &'static str, detail: String },

    /// Named resource does not exist on the control plane
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// An argument cannot be passed through the remote shell unchanged
    #[error("cannot pass {0:?} to the remote shell")]
    Unquotable(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
