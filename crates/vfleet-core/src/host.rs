//! Host builder.
//!
//! Building a host happens in two steps. [`HostBuilder::plan`] is pure: it
//! assigns defaults, lays out disks and NICs, renders the domain document and,
//! for the install-server, the seed documents. [`HostBuilder::provision`]
//! then runs the disk and seed commands on the target. Planning every host
//! before touching the target lets document errors surface before any
//! mutation.

use crate::document::{HostSpec, NicSpec, DEFAULT_MEMORY_KIB, DEFAULT_NCPUS};
use crate::error::{CoreError, Result};
use crate::install_server::InstallServerInfo;
use crate::naming::NamingScheme;
use crate::remote::RemoteRunner;
use crate::seed::SeedBundle;
use crate::templates::{DiskAttributes, HostAttributes, NicAttributes, TemplateRenderer};
use crate::util::{canonical_size, disk_device_name, random_mac};
use uuid::Uuid;

/// Size of the install-server system disk.
pub const INSTALL_SERVER_DISK_SIZE: &str = "30G";

/// A disk image to create on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskJob {
    /// Copy-on-write clone of a base image, then resized.
    Clone {
        base: String,
        path: String,
        size: String,
    },
    /// Empty image of the given size.
    Fresh { path: String, size: String },
}

impl DiskJob {
    /// `qemu-img` invocations creating the disk.
    pub fn commands(&self) -> Vec<Vec<String>> {
        fn argv(parts: &[&str]) -> Vec<String> {
            parts.iter().map(|s| s.to_string()).collect()
        }
        match self {
            Self::Clone { base, path, size } => vec![
                argv(&[
                    "qemu-img",
                    "create",
                    "-q",
                    "-f",
                    "qcow2",
                    "-F",
                    "qcow2",
                    "-b",
                    base.as_str(),
                    path.as_str(),
                ]),
                argv(&["qemu-img", "resize", "-q", path.as_str(), &canonical_size(size)]),
            ],
            Self::Fresh { path, size } => vec![argv(&[
                "qemu-img",
                "create",
                "-q",
                "-f",
                "qcow2",
                path.as_str(),
                &canonical_size(size),
            ])],
        }
    }
}

/// Everything needed to materialize one host.
#[derive(Debug, Clone)]
pub struct HostPlan {
    /// Declared hostname.
    pub hostname: String,
    /// Domain name on the control plane.
    pub domain: String,
    pub attributes: HostAttributes,
    pub disks: Vec<DiskJob>,
    /// Seed data, only for the install-server.
    pub seed: Option<SeedBundle>,
    /// Rendered domain document.
    pub xml: String,
}

/// Turns host specs into domain documents and provisions their storage.
pub struct HostBuilder<'a> {
    renderer: &'a TemplateRenderer,
    naming: &'a NamingScheme,
    install_server: &'a InstallServerInfo,
    public_network: &'a str,
    emulator: &'a str,
    pub_key: &'a str,
}

impl<'a> HostBuilder<'a> {
    pub fn new(
        renderer: &'a TemplateRenderer,
        naming: &'a NamingScheme,
        install_server: &'a InstallServerInfo,
        public_network: &'a str,
        emulator: &'a str,
        pub_key: &'a str,
    ) -> Self {
        Self {
            renderer,
            naming,
            install_server,
            public_network,
            emulator,
            pub_key,
        }
    }

    /// Lay out and render a host without touching the target.
    pub fn plan(&self, hostname: &str, spec: &HostSpec) -> Result<HostPlan> {
        let domain = self.naming.domain(hostname);

        let mut disk_specs: Vec<(Option<String>, String)> = spec
            .disks
            .iter()
            .map(|d| (d.clone_from.clone(), d.size.clone()))
            .collect();
        let mut nic_specs = spec.nics.clone();
        let mut seed = None;
        if spec.is_install_server() {
            disk_specs = vec![(
                Some(self.naming.install_server_image(&self.install_server.version)),
                INSTALL_SERVER_DISK_SIZE.to_string(),
            )];
            nic_specs.push(NicSpec {
                mac: Some(self.install_server.mac.clone()),
                network_name: Some(self.public_network.to_string()),
                ..Default::default()
            });
            seed = Some(SeedBundle::render(
                self.renderer,
                self.naming,
                &domain,
                self.install_server,
                self.pub_key,
            )?);
        }

        let mut disks = Vec::with_capacity(disk_specs.len());
        let mut jobs = Vec::with_capacity(disk_specs.len());
        for (index, (clone_from, size)) in disk_specs.into_iter().enumerate() {
            let name = disk_device_name(index).ok_or_else(|| {
                CoreError::InvalidDocument(format!("host {hostname}: more than 26 disks"))
            })?;
            let path = self.naming.disk_path(&domain, index);
            jobs.push(match clone_from {
                Some(base) => DiskJob::Clone {
                    base,
                    path: path.clone(),
                    size,
                },
                None => DiskJob::Fresh {
                    path: path.clone(),
                    size,
                },
            });
            disks.push(DiskAttributes {
                name,
                path,
                boot_order: (index == 0).then_some(1),
            });
        }

        let nics = nic_specs
            .into_iter()
            .enumerate()
            .map(|(index, nic)| NicAttributes {
                mac: nic.mac.unwrap_or_else(random_mac),
                name: nic.name.unwrap_or_else(|| format!("noname{index}")),
                network_name: nic
                    .network_name
                    .unwrap_or_else(|| self.naming.private_network()),
                boot_order: (index == 0).then_some(2),
            })
            .collect();

        let attributes = HostAttributes {
            hostname: hostname.to_string(),
            hostname_with_prefix: domain.clone(),
            uuid: spec
                .uuid
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            memory: spec.memory.unwrap_or(DEFAULT_MEMORY_KIB),
            ncpus: spec.ncpus.unwrap_or(DEFAULT_NCPUS),
            emulator: self.emulator.to_string(),
            serial: spec.serial.clone(),
            product_name: spec.product_name.clone(),
            seed_image: seed.as_ref().map(|s| s.image.clone()),
            disks,
            nics,
        };
        let xml = self.renderer.render(&attributes)?;

        Ok(HostPlan {
            hostname: hostname.to_string(),
            domain,
            attributes,
            disks: jobs,
            seed,
            xml,
        })
    }

    /// Push seed data and create the disks of a planned host.
    pub async fn provision(&self, plan: &HostPlan, runner: &RemoteRunner<'_>) -> Result<()> {
        if let Some(seed) = &plan.seed {
            seed.push(runner).await?;
        }
        for job in &plan.disks {
            for command in job.commands() {
                runner.run(&command).await?;
            }
        }
        tracing::debug!(domain = %plan.domain, disks = plan.disks.len(), "Provisioned host storage");
        Ok(())
    }

    /// Plan and provision a host, returning its domain document.
    pub async fn build(
        &self,
        hostname: &str,
        spec: &HostSpec,
        runner: &RemoteRunner<'_>,
    ) -> Result<HostPlan> {
        let plan = self.plan(hostname, spec)?;
        self.provision(&plan, runner).await?;
        Ok(plan)
    }
}
