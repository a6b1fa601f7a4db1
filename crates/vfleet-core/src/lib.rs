//! # vfleet-core
//!
//! Reconciliation engine for small libvirt VM fleets.
//!
//! A fleet is described by a [`DeclarativeDocument`]: hosts with disks, NICs
//! and a profile. Exactly one host carries the `install-server` profile; it
//! boots from a cloned base image with a cloud-init seed and is the host the
//! run waits for.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       Reconciler                         │
//! │  preflight ─▶ networks ─▶ hosts (sorted) ─▶ lease wait   │
//! └──────────────────────────────────────────────────────────┘
//!        │                 │                       │
//!        ▼                 ▼                       │
//! ┌───────────────┐ ┌───────────────┐              │
//! │NetworkBuilder │ │  HostBuilder  │              │
//! │ uuid/mac/     │ │ disks, NICs,  │              │
//! │ bridge, DHCP  │ │ seed bundle   │              │
//! └───────────────┘ └───────────────┘              │
//!        │                 │  RemoteRunner         │
//!        ▼                 ▼  (failure policy)     ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │         vfleet-virt: ControlPlane / RemoteShell          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use vfleet_core::{DeclarativeDocument, ReconcileConfig, Reconciler};
//!
//! # async fn example() -> vfleet_core::Result<()> {
//! let doc = DeclarativeDocument::from_path("fleet.yaml".as_ref())?;
//! let config = ReconcileConfig::builder()
//!     .target_host("hv1.example.com")
//!     .prefix("t1")
//!     .pub_key_file("/root/.ssh/id_rsa.pub")
//!     .build()?;
//!
//! let report = Reconciler::connect(config)?.run(&doc).await?;
//! println!("install-server is at {}", report.install_server_ip);
//! # Ok(())
//! # }
//! ```

mod config;
mod document;
mod error;
mod host;
mod install_server;
mod lease;
mod naming;
mod network;
mod reconcile;
mod remote;
mod report;
mod seed;
mod templates;
mod util;

pub use config::{
    ReconcileConfig, ReconcileConfigBuilder, RemoteFailurePolicy, DEFAULT_EMULATOR,
    DEFAULT_IMAGE_DIR, DEFAULT_PUBLIC_NETWORK, DEFAULT_REMOTE_USER,
};
pub use document::{
    DeclarativeDocument, DiskSpec, HostSpec, NicSpec, DEFAULT_MEMORY_KIB, DEFAULT_NCPUS,
    INSTALL_SERVER_PROFILE,
};
pub use error::{CoreError, Result};
pub use host::{DiskJob, HostBuilder, HostPlan};
pub use install_server::{AdminNetwork, InstallServerInfo};
pub use lease::wait_for_lease;
pub use naming::{NamingScheme, Prefix};
pub use network::{DhcpDefinition, NetworkBuilder, NetworkDefinition, NetworkDocument};
pub use reconcile::Reconciler;
pub use remote::RemoteRunner;
pub use report::{ReconcileReport, ResourceOutcome, ResourceReport};
pub use seed::SeedBundle;
pub use templates::{
    DhcpAttributes, DhcpRangeAttributes, DiskAttributes, DocumentAttributes, HostAttributes,
    MetaData, NetworkAttributes, NicAttributes, SeedAttributes, TemplateRenderer, UserData,
};
pub use util::canonical_size;
