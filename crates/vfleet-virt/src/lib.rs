//! # vfleet-virt
//!
//! Adapters between vfleet and a remote virtualization host:
//!
//! - [`ControlPlane`]: list, look up, define, start, destroy and undefine
//!   networks and domains, and read domain interfaces and DHCP leases.
//!   [`VirshControlPlane`] drives `virsh` over a `qemu+ssh://` connection.
//! - [`RemoteShell`]: run commands and copy files on the host.
//!   [`SshShell`] uses `ssh` and `scp`.
//!
//! Neither adapter holds any state of its own; every decision belongs to the
//! caller. The [`mock`] module provides in-memory doubles for both.

mod command;
mod control;
mod error;
pub mod mock;
mod shell;

pub use command::CommandStatus;
pub use control::{
    parse_dhcp_leases, parse_domain_interfaces, parse_name_list, ControlPlane, DhcpLease,
    DomainHandle, DomainInterface, DomainState, NetworkHandle, VirshControlPlane,
};
pub use error::{Result, VirtError};
pub use shell::{RemoteShell, SshShell};
