//! The reconciler.
//!
//! A run brings the target host in line with a [`DeclarativeDocument`]:
//!
//! 1. Preflight: derive the install-server facts, read the SSH public key,
//!    plan every network and host. Nothing on the target changes before
//!    this step succeeds.
//! 2. Networks: the private network, then the public NAT network.
//! 3. Hosts, in lexicographic hostname order.
//! 4. Wait for the install-server to obtain a lease on the public network.
//!
//! Existing resources are skipped, or destroyed and recreated with
//! `replace`. Control-plane errors abort the run; nothing is rolled back.

use crate::config::{ReconcileConfig, RemoteFailurePolicy};
use crate::document::DeclarativeDocument;
use crate::error::{CoreError, Result};
use crate::host::{HostBuilder, HostPlan};
use crate::install_server::InstallServerInfo;
use crate::lease::wait_for_lease;
use crate::network::{NetworkBuilder, NetworkDefinition, NetworkDocument};
use crate::remote::RemoteRunner;
use crate::report::{ReconcileReport, ResourceOutcome};
use crate::templates::TemplateRenderer;
use std::path::Path;
use std::sync::Arc;
use tracing::Instrument;
use vfleet_virt::{
    ControlPlane, DomainState, RemoteShell, SshShell, VirshControlPlane, VirtError,
};

/// Drives one target host towards a declared fleet.
pub struct Reconciler {
    config: ReconcileConfig,
    control: Arc<dyn ControlPlane>,
    shell: Arc<dyn RemoteShell>,
    renderer: TemplateRenderer,
}

impl Reconciler {
    pub fn new(
        config: ReconcileConfig,
        control: Arc<dyn ControlPlane>,
        shell: Arc<dyn RemoteShell>,
    ) -> Result<Self> {
        Ok(Self {
            config,
            control,
            shell,
            renderer: TemplateRenderer::from_embedded()?,
        })
    }

    /// Reconciler using `virsh` and `ssh` against the configured target.
    pub fn connect(config: ReconcileConfig) -> Result<Self> {
        let control = VirshControlPlane::new(&config.remote_user, &config.target_host);
        let shell = SshShell::new(config.remote_user.clone(), config.target_host.clone());
        tracing::debug!(uri = %control.uri(), "Using virsh control plane");
        Self::new(config, Arc::new(control), Arc::new(shell))
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Reconcile the target with `doc` and wait for the install-server lease.
    pub async fn run(&self, doc: &DeclarativeDocument) -> Result<ReconcileReport> {
        let span = tracing::info_span!(
            "reconcile",
            prefix = %self.config.prefix,
            target = %self.config.target_host
        );
        self.run_inner(doc).instrument(span).await
    }

    async fn run_inner(&self, doc: &DeclarativeDocument) -> Result<ReconcileReport> {
        let naming = self.config.naming();

        let info = InstallServerInfo::from_document(doc)?;
        let pub_key = read_pub_key(&self.config.pub_key_file).await?;
        let hosts = HostBuilder::new(
            &self.renderer,
            &naming,
            &info,
            &self.config.public_network,
            &self.config.emulator,
            &pub_key,
        );
        let plans = doc
            .hosts
            .iter()
            .map(|(hostname, spec)| hosts.plan(hostname, spec))
            .collect::<Result<Vec<HostPlan>>>()?;
        let networks = NetworkBuilder::new(&self.renderer);
        let network_docs = [
            networks.build(&naming.private_network(), &NetworkDefinition::private())?,
            networks.build(&self.config.public_network, &NetworkDefinition::public_nat())?,
        ];
        tracing::info!(
            hosts = plans.len(),
            install_server = %info.hostname,
            replace = self.config.replace,
            "Starting reconciliation"
        );

        let mut report = ReconcileReport::new(naming.prefix().as_str(), &self.config.target_host);

        let existing = self.control.list_networks().await?;
        for network in &network_docs {
            let outcome = self.reconcile_network(network, &existing).await?;
            report.network(&network.name, outcome);
        }
        let public = self
            .control
            .lookup_network(&self.config.public_network)
            .await?;

        let mut install_server_failure = None;
        let mut install_server_skipped = false;
        for plan in &plans {
            let span = tracing::info_span!("host", domain = %plan.domain);
            match self.reconcile_host(&hosts, plan).instrument(span).await {
                Ok(outcome) => {
                    if plan.hostname == info.hostname {
                        install_server_skipped = outcome == ResourceOutcome::Skipped;
                    }
                    report.host(&plan.domain, outcome);
                }
                Err(err @ CoreError::RemoteCommandFailed { .. })
                    if self.config.remote_failure_policy == RemoteFailurePolicy::SkipHost =>
                {
                    tracing::warn!(domain = %plan.domain, error = %err, "Skipping host");
                    report.host(
                        &plan.domain,
                        ResourceOutcome::Failed {
                            reason: err.to_string(),
                        },
                    );
                    if plan.hostname == info.hostname {
                        install_server_failure = Some(err);
                    }
                }
                Err(err) => return Err(err),
            }
        }
        if let Some(err) = install_server_failure {
            tracing::error!("Install-server was not created, not waiting for its lease");
            return Err(err);
        }

        // A skipped install-server keeps the MAC it was defined with.
        let mac = if install_server_skipped {
            self.public_mac(&naming.domain(&info.hostname)).await?
        } else {
            info.mac.clone()
        };
        let lease = wait_for_lease(
            self.control.as_ref(),
            &public,
            &mac,
            self.config.lease_poll_interval,
            self.config.lease_timeout,
        )
        .await?;
        report.finish(lease.ipaddr);
        tracing::info!(
            ip = %report.install_server_ip,
            changed = report.changed(),
            "Reconciliation complete"
        );
        Ok(report)
    }

    async fn reconcile_network(
        &self,
        network: &NetworkDocument,
        existing: &[String],
    ) -> Result<ResourceOutcome> {
        let mut outcome = ResourceOutcome::Created;
        if existing.contains(&network.name) {
            if !self.config.replace {
                tracing::info!(network = %network.name, "Network already exists, skipping");
                return Ok(ResourceOutcome::Skipped);
            }
            tracing::info!(network = %network.name, "Cleaning existing network");
            let handle = self.control.lookup_network(&network.name).await?;
            self.control.destroy_network(&handle).await?;
            outcome = ResourceOutcome::Replaced;
        }
        tracing::info!(network = %network.name, "Creating network");
        self.control.create_network(&network.xml).await?;
        Ok(outcome)
    }

    async fn reconcile_host(
        &self,
        hosts: &HostBuilder<'_>,
        plan: &HostPlan,
    ) -> Result<ResourceOutcome> {
        let mut outcome = ResourceOutcome::Created;
        let existing = self.control.list_domains().await?;
        if existing.contains(&plan.domain) {
            if !self.config.replace {
                tracing::info!(domain = %plan.domain, "Domain already exists, skipping");
                return Ok(ResourceOutcome::Skipped);
            }
            self.clean_domain(&plan.domain).await?;
            outcome = ResourceOutcome::Replaced;
        }

        let runner = RemoteRunner::new(
            self.shell.as_ref(),
            self.config.remote_failure_policy,
            &plan.hostname,
        );
        hosts.provision(plan, &runner).await?;

        tracing::info!(domain = %plan.domain, "Creating domain");
        self.control.define_domain(&plan.xml).await?;
        let handle = self.control.lookup_domain(&plan.domain).await?;
        self.control.start_domain(&handle).await?;
        Ok(outcome)
    }

    /// MAC of the interface an existing domain has on the public network.
    async fn public_mac(&self, domain: &str) -> Result<String> {
        let handle = self.control.lookup_domain(domain).await?;
        let interfaces = self.control.domain_interfaces(&handle).await?;
        let mac = interfaces
            .into_iter()
            .find(|i| i.source == self.config.public_network)
            .map(|i| i.mac)
            .ok_or_else(|| CoreError::NoPublicInterface {
                domain: domain.to_string(),
                network: self.config.public_network.clone(),
            })?;
        tracing::debug!(%domain, %mac, "Using MAC of existing install-server");
        Ok(mac)
    }

    /// Destroy an active domain, then undefine it.
    async fn clean_domain(&self, name: &str) -> Result<()> {
        let handle = self.control.lookup_domain(name).await?;
        let state = self.control.domain_state(&handle).await?;
        tracing::info!(domain = %name, %state, "Cleaning existing domain");
        if state.is_active() {
            self.control.destroy_domain(&handle).await?;
        }
        match self.control.domain_state(&handle).await {
            Ok(DomainState::ShutOff | DomainState::Crashed | DomainState::NoState) => {
                self.control.undefine_domain(&handle).await?;
            }
            Ok(state) => {
                return Err(CoreError::Virt(VirtError::Command {
                    command: format!("destroy {name}"),
                    stderr: format!("domain still {state} after destroy"),
                }));
            }
            // Transient domains vanish once destroyed.
            Err(VirtError::NotFound { .. }) => {}
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }
}

async fn read_pub_key(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CoreError::MissingPubKey {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{HostSpec, NicSpec, INSTALL_SERVER_PROFILE};
    use std::io::Write;
    use vfleet_virt::mock::{ControlPlaneCall, MockControlPlane, MockShell};
    use vfleet_virt::DhcpLease;

    const ROUTER_MAC: &str = "52:54:00:00:00:01";

    fn document() -> DeclarativeDocument {
        let mut doc = DeclarativeDocument::default();
        doc.hosts.insert(
            "router".into(),
            HostSpec {
                profile: INSTALL_SERVER_PROFILE.into(),
                nics: vec![NicSpec {
                    mac: Some(ROUTER_MAC.into()),
                    ip: Some("10.0.0.1/24".into()),
                    ..Default::default()
                }],
                ..Default::default()
            },
        );
        doc.hosts.insert(
            "node1".into(),
            HostSpec {
                profile: "compute".into(),
                nics: vec![NicSpec::default()],
                ..Default::default()
            },
        );
        doc
    }

    fn key_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ssh-rsa AAAA me@host").unwrap();
        file
    }

    fn reconciler(
        control: &Arc<MockControlPlane>,
        shell: &Arc<MockShell>,
        key: &Path,
        replace: bool,
    ) -> Reconciler {
        let config = ReconcileConfig::builder()
            .target_host("hv1")
            .prefix("t1")
            .replace(replace)
            .pub_key_file(key)
            .build()
            .unwrap();
        Reconciler::new(config, control.clone(), shell.clone()).unwrap()
    }

    fn router_lease() -> Vec<DhcpLease> {
        vec![DhcpLease {
            mac: ROUTER_MAC.into(),
            ipaddr: "192.168.140.10".into(),
            hostname: None,
        }]
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_running_domain() {
        let control = Arc::new(MockControlPlane::new().with_domain("t1_node1", DomainState::Running));
        let shell = Arc::new(MockShell::new());
        let key = key_file();
        let r = reconciler(&control, &shell, key.path(), true);
        r.clean_domain("t1_node1").await.unwrap();
        assert_eq!(
            control.mutations(),
            vec![
                ControlPlaneCall::DestroyDomain("t1_node1".into()),
                ControlPlaneCall::UndefineDomain("t1_node1".into()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_shut_off_domain() {
        let control = Arc::new(MockControlPlane::new().with_domain("t1_node1", DomainState::ShutOff));
        let shell = Arc::new(MockShell::new());
        let key = key_file();
        let r = reconciler(&control, &shell, key.path(), true);
        r.clean_domain("t1_node1").await.unwrap();
        assert_eq!(
            control.mutations(),
            vec![ControlPlaneCall::UndefineDomain("t1_node1".into())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_key_is_precondition() {
        let control = Arc::new(MockControlPlane::new());
        let shell = Arc::new(MockShell::new());
        let r = reconciler(&control, &shell, Path::new("/nonexistent/id_rsa.pub"), false);
        let err = r.run(&document()).await.unwrap_err();
        assert!(matches!(err, CoreError::MissingPubKey { .. }));
        assert!(err.is_precondition());
        assert!(control.calls().is_empty());
        assert!(shell.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_outcomes() {
        let control = Arc::new(
            MockControlPlane::new()
                .with_network("nat")
                .with_domain("t1_node1", DomainState::Running),
        );
        let shell = Arc::new(MockShell::new());
        control.push_leases("nat", router_lease());
        let key = key_file();
        let report = reconciler(&control, &shell, key.path(), false)
            .run(&document())
            .await
            .unwrap();

        let networks: Vec<(&str, &ResourceOutcome)> =
            report.networks.iter().map(|r| (r.name.as_str(), &r.outcome)).collect();
        assert_eq!(
            networks,
            vec![
                ("t1_sps", &ResourceOutcome::Created),
                ("nat", &ResourceOutcome::Skipped),
            ]
        );
        let hosts: Vec<(&str, &ResourceOutcome)> =
            report.hosts.iter().map(|r| (r.name.as_str(), &r.outcome)).collect();
        assert_eq!(
            hosts,
            vec![
                ("t1_node1", &ResourceOutcome::Skipped),
                ("t1_router", &ResourceOutcome::Created),
            ]
        );
        assert_eq!(report.install_server_ip, "192.168.140.10");
        assert_eq!(report.prefix, "t1");
    }
}
