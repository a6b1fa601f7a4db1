//! In-memory control plane and remote shell for testing.
//!
//! Both doubles record every call in order and model just enough remote state
//! (existing networks, domains and their run state, DHCP leases, files pushed
//! to the host) to drive the reconciler deterministically.

use crate::command::CommandStatus;
use crate::control::{
    ControlPlane, DhcpLease, DomainHandle, DomainInterface, DomainState, NetworkHandle,
};
use crate::error::{Result, VirtError};
use crate::shell::RemoteShell;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// A call made against [`MockControlPlane`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPlaneCall {
    ListNetworks,
    ListDomains,
    LookupNetwork(String),
    LookupDomain(String),
    DomainState(String),
    DestroyDomain(String),
    UndefineDomain(String),
    DestroyNetwork(String),
    CreateNetwork { name: String, xml: String },
    DefineDomain { name: String, xml: String },
    StartDomain(String),
    DhcpLeases(String),
    DomainInterfaces(String),
}

impl ControlPlaneCall {
    /// Whether the call changes remote state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::DestroyDomain(_)
                | Self::UndefineDomain(_)
                | Self::DestroyNetwork(_)
                | Self::CreateNetwork { .. }
                | Self::DefineDomain { .. }
                | Self::StartDomain(_)
        )
    }

    fn op(&self) -> &'static str {
        match self {
            Self::ListNetworks => "list_networks",
            Self::ListDomains => "list_domains",
            Self::LookupNetwork(_) => "lookup_network",
            Self::LookupDomain(_) => "lookup_domain",
            Self::DomainState(_) => "domain_state",
            Self::DestroyDomain(_) => "destroy_domain",
            Self::UndefineDomain(_) => "undefine_domain",
            Self::DestroyNetwork(_) => "destroy_network",
            Self::CreateNetwork { .. } => "create_network",
            Self::DefineDomain { .. } => "define_domain",
            Self::StartDomain(_) => "start_domain",
            Self::DhcpLeases(_) => "dhcp_leases",
            Self::DomainInterfaces(_) => "domain_interfaces",
        }
    }
}

#[derive(Debug, Default)]
struct ControlState {
    networks: BTreeMap<String, String>,
    domains: BTreeMap<String, (String, DomainState)>,
    interfaces: HashMap<String, Vec<DomainInterface>>,
    leases: HashMap<String, VecDeque<Vec<DhcpLease>>>,
    failing: HashSet<&'static str>,
    calls: Vec<ControlPlaneCall>,
    next_uuid: u64,
}

impl ControlState {
    fn uuid(&mut self) -> String {
        self.next_uuid += 1;
        format!("00000000-0000-0000-0000-{:012}", self.next_uuid)
    }

    fn record(&mut self, call: ControlPlaneCall) -> Result<()> {
        let op = call.op();
        self.calls.push(call);
        if self.failing.contains(op) {
            return Err(VirtError::Command {
                command: op.to_string(),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

/// A [`ControlPlane`] that keeps all state in memory.
#[derive(Debug, Default)]
pub struct MockControlPlane {
    state: Mutex<ControlState>,
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pre-create a network.
    pub fn with_network(self, name: &str) -> Self {
        {
            let mut state = self.lock();
            let uuid = state.uuid();
            state.networks.insert(name.to_string(), uuid);
        }
        self
    }

    /// Pre-create a domain in the given state.
    pub fn with_domain(self, name: &str, run_state: DomainState) -> Self {
        {
            let mut state = self.lock();
            let uuid = state.uuid();
            state.domains.insert(name.to_string(), (uuid, run_state));
        }
        self
    }

    /// Attach an interface to a pre-created domain.
    pub fn with_interface(self, domain: &str, network: &str, mac: &str) -> Self {
        self.lock()
            .interfaces
            .entry(domain.to_string())
            .or_default()
            .push(DomainInterface {
                source: network.to_string(),
                mac: mac.to_lowercase(),
            });
        self
    }

    /// Queue the lease table returned by the next poll of `network`.
    ///
    /// The last queued table keeps being returned once the queue drains.
    pub fn push_leases(&self, network: &str, leases: Vec<DhcpLease>) {
        self.lock()
            .leases
            .entry(network.to_string())
            .or_default()
            .push_back(leases);
    }

    /// Make every call of the named operation fail, e.g. `"define_domain"`.
    pub fn fail_on(&self, op: &'static str) {
        self.lock().failing.insert(op);
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<ControlPlaneCall> {
        self.lock().calls.clone()
    }

    /// Only the calls that changed remote state.
    pub fn mutations(&self) -> Vec<ControlPlaneCall> {
        self.calls().into_iter().filter(|c| c.is_mutation()).collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn network_names(&self) -> Vec<String> {
        self.lock().networks.keys().cloned().collect()
    }

    pub fn domain_names(&self) -> Vec<String> {
        self.lock().domains.keys().cloned().collect()
    }

    pub fn state_of(&self, domain: &str) -> Option<DomainState> {
        self.lock().domains.get(domain).map(|(_, s)| *s)
    }
}

/// Extract the top-level `<name>` of a network or domain document.
fn document_name(xml: &str) -> Result<String> {
    let start = xml.find("<name>").map(|i| i + "<name>".len());
    let end = xml.find("</name>");
    match (start, end) {
        (Some(start), Some(end)) if start <= end => Ok(xml[start..end].trim().to_string()),
        _ => Err(VirtError::Parse {
            what: "document name",
            detail: "missing <name> element".to_string(),
        }),
    }
}

/// Extract the `<interface>` elements of a domain document.
fn document_interfaces(xml: &str) -> Vec<DomainInterface> {
    fn attribute<'a>(block: &'a str, prefix: &str) -> Option<&'a str> {
        let start = block.find(prefix)? + prefix.len();
        let len = block[start..].find('\'')?;
        Some(&block[start..start + len])
    }

    xml.split("<interface")
        .skip(1)
        .filter_map(|rest| {
            let block = &rest[..rest.find("</interface>")?];
            Some(DomainInterface {
                source: attribute(block, "<source network='")?.to_string(),
                mac: attribute(block, "<mac address='")?.to_lowercase(),
            })
        })
        .collect()
}

fn not_found(kind: &'static str, name: &str) -> VirtError {
    VirtError::NotFound {
        kind,
        name: name.to_string(),
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn list_networks(&self) -> Result<Vec<String>> {
        let mut state = self.lock();
        state.record(ControlPlaneCall::ListNetworks)?;
        Ok(state.networks.keys().cloned().collect())
    }

    async fn list_domains(&self) -> Result<Vec<String>> {
        let mut state = self.lock();
        state.record(ControlPlaneCall::ListDomains)?;
        Ok(state.domains.keys().cloned().collect())
    }

    async fn lookup_network(&self, name: &str) -> Result<NetworkHandle> {
        let mut state = self.lock();
        state.record(ControlPlaneCall::LookupNetwork(name.to_string()))?;
        let uuid = state
            .networks
            .get(name)
            .ok_or_else(|| not_found("network", name))?;
        Ok(NetworkHandle {
            name: name.to_string(),
            uuid: uuid.clone(),
        })
    }

    async fn lookup_domain(&self, name: &str) -> Result<DomainHandle> {
        let mut state = self.lock();
        state.record(ControlPlaneCall::LookupDomain(name.to_string()))?;
        let (uuid, _) = state
            .domains
            .get(name)
            .ok_or_else(|| not_found("domain", name))?;
        Ok(DomainHandle {
            name: name.to_string(),
            uuid: uuid.clone(),
        })
    }

    async fn domain_state(&self, domain: &DomainHandle) -> Result<DomainState> {
        let mut state = self.lock();
        state.record(ControlPlaneCall::DomainState(domain.name.clone()))?;
        state
            .domains
            .get(&domain.name)
            .map(|(_, s)| *s)
            .ok_or_else(|| not_found("domain", &domain.name))
    }

    async fn destroy_domain(&self, domain: &DomainHandle) -> Result<()> {
        let mut state = self.lock();
        state.record(ControlPlaneCall::DestroyDomain(domain.name.clone()))?;
        let entry = state
            .domains
            .get_mut(&domain.name)
            .ok_or_else(|| not_found("domain", &domain.name))?;
        if !entry.1.is_active() {
            return Err(VirtError::Command {
                command: "destroy_domain".to_string(),
                stderr: "domain is not running".to_string(),
            });
        }
        entry.1 = DomainState::ShutOff;
        Ok(())
    }

    async fn undefine_domain(&self, domain: &DomainHandle) -> Result<()> {
        let mut state = self.lock();
        state.record(ControlPlaneCall::UndefineDomain(domain.name.clone()))?;
        state.interfaces.remove(&domain.name);
        state
            .domains
            .remove(&domain.name)
            .map(|_| ())
            .ok_or_else(|| not_found("domain", &domain.name))
    }

    async fn destroy_network(&self, network: &NetworkHandle) -> Result<()> {
        let mut state = self.lock();
        state.record(ControlPlaneCall::DestroyNetwork(network.name.clone()))?;
        state
            .networks
            .remove(&network.name)
            .map(|_| ())
            .ok_or_else(|| not_found("network", &network.name))
    }

    async fn create_network(&self, xml: &str) -> Result<()> {
        let name = document_name(xml)?;
        let mut state = self.lock();
        state.record(ControlPlaneCall::CreateNetwork {
            name: name.clone(),
            xml: xml.to_string(),
        })?;
        if state.networks.contains_key(&name) {
            return Err(VirtError::Command {
                command: "create_network".to_string(),
                stderr: format!("network '{name}' already exists"),
            });
        }
        let uuid = state.uuid();
        state.networks.insert(name, uuid);
        Ok(())
    }

    async fn define_domain(&self, xml: &str) -> Result<()> {
        let name = document_name(xml)?;
        let mut state = self.lock();
        state.record(ControlPlaneCall::DefineDomain {
            name: name.clone(),
            xml: xml.to_string(),
        })?;
        if state.domains.contains_key(&name) {
            return Err(VirtError::Command {
                command: "define_domain".to_string(),
                stderr: format!("domain '{name}' already exists"),
            });
        }
        let uuid = state.uuid();
        state.interfaces.insert(name.clone(), document_interfaces(xml));
        state.domains.insert(name, (uuid, DomainState::ShutOff));
        Ok(())
    }

    async fn start_domain(&self, domain: &DomainHandle) -> Result<()> {
        let mut state = self.lock();
        state.record(ControlPlaneCall::StartDomain(domain.name.clone()))?;
        let entry = state
            .domains
            .get_mut(&domain.name)
            .ok_or_else(|| not_found("domain", &domain.name))?;
        entry.1 = DomainState::Running;
        Ok(())
    }

    async fn dhcp_leases(&self, network: &NetworkHandle) -> Result<Vec<DhcpLease>> {
        let mut state = self.lock();
        state.record(ControlPlaneCall::DhcpLeases(network.name.clone()))?;
        let queue = match state.leases.get_mut(&network.name) {
            Some(queue) => queue,
            None => return Ok(Vec::new()),
        };
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap_or_default())
        } else {
            Ok(queue.front().cloned().unwrap_or_default())
        }
    }

    async fn domain_interfaces(&self, domain: &DomainHandle) -> Result<Vec<DomainInterface>> {
        let mut state = self.lock();
        state.record(ControlPlaneCall::DomainInterfaces(domain.name.clone()))?;
        if !state.domains.contains_key(&domain.name) {
            return Err(not_found("domain", &domain.name));
        }
        Ok(state
            .interfaces
            .get(&domain.name)
            .cloned()
            .unwrap_or_default())
    }
}

/// A call made against [`MockShell`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCall {
    Run(Vec<String>),
    Copy {
        remote: String,
        /// Contents of the local file at the time of the copy.
        contents: String,
    },
}

#[derive(Debug, Clone)]
enum FailWhen {
    /// The program (first argument) equals the value; `scp` for copies.
    Program(String),
    /// Any argument, or the copy destination, contains the value.
    Argument(String),
}

impl FailWhen {
    fn matches(&self, program: &str, args: &[String]) -> bool {
        match self {
            Self::Program(p) => p == program,
            Self::Argument(needle) => args.iter().any(|a| a.contains(needle.as_str())),
        }
    }
}

#[derive(Debug, Default)]
struct ShellState {
    calls: Vec<ShellCall>,
    failures: Vec<(FailWhen, CommandStatus)>,
}

/// A [`RemoteShell`] that records commands and never touches a host.
#[derive(Debug, Default)]
pub struct MockShell {
    state: Mutex<ShellState>,
}

impl MockShell {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ShellState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail every command whose program (first argument) is `program`.
    /// Use `"scp"` to fail file copies.
    pub fn fail_program(&self, program: &str, status: CommandStatus) {
        self.lock()
            .failures
            .push((FailWhen::Program(program.to_string()), status));
    }

    /// Fail every command with an argument containing `needle`, and every
    /// copy whose destination contains it.
    pub fn fail_argument(&self, needle: &str, status: CommandStatus) {
        self.lock()
            .failures
            .push((FailWhen::Argument(needle.to_string()), status));
    }

    pub fn calls(&self) -> Vec<ShellCall> {
        self.lock().calls.clone()
    }

    /// Argument vectors of all `run` calls.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ShellCall::Run(args) => Some(args),
                ShellCall::Copy { .. } => None,
            })
            .collect()
    }

    /// Remote paths and contents of all copied files.
    pub fn copies(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ShellCall::Copy { remote, contents } => Some((remote, contents)),
                ShellCall::Run(_) => None,
            })
            .collect()
    }

    fn status_for(&self, program: &str, args: &[String]) -> CommandStatus {
        self.lock()
            .failures
            .iter()
            .find(|(when, _)| when.matches(program, args))
            .map(|(_, s)| s.clone())
            .unwrap_or_else(CommandStatus::ok)
    }
}

#[async_trait]
impl RemoteShell for MockShell {
    async fn run(&self, args: &[String]) -> Result<CommandStatus> {
        self.lock().calls.push(ShellCall::Run(args.to_vec()));
        let program = args.first().map(String::as_str).unwrap_or_default();
        Ok(self.status_for(program, args))
    }

    async fn copy(&self, local: &Path, remote: &str) -> Result<CommandStatus> {
        let contents = tokio::fs::read_to_string(local).await?;
        self.lock().calls.push(ShellCall::Copy {
            remote: remote.to_string(),
            contents,
        });
        Ok(self.status_for("scp", &[remote.to_string()]))
    }
}
