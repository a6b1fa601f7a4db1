//! Outcome of a reconciliation run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to one declared resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResourceOutcome {
    /// Did not exist and was created.
    Created,
    /// Existed and was destroyed and recreated.
    Replaced,
    /// Existed and was left untouched.
    Skipped,
    /// Abandoned after a failed remote command.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: ResourceOutcome,
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub prefix: String,
    pub target_host: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub networks: Vec<ResourceReport>,
    /// Domains, in reconciliation order.
    pub hosts: Vec<ResourceReport>,
    pub install_server_ip: String,
}

impl ReconcileReport {
    pub(crate) fn new(prefix: &str, target_host: &str) -> Self {
        let now = Utc::now();
        Self {
            prefix: prefix.to_string(),
            target_host: target_host.to_string(),
            started_at: now,
            finished_at: now,
            networks: Vec::new(),
            hosts: Vec::new(),
            install_server_ip: String::new(),
        }
    }

    pub(crate) fn network(&mut self, name: &str, outcome: ResourceOutcome) {
        self.networks.push(ResourceReport {
            name: name.to_string(),
            outcome,
        });
    }

    pub(crate) fn host(&mut self, name: &str, outcome: ResourceOutcome) {
        self.hosts.push(ResourceReport {
            name: name.to_string(),
            outcome,
        });
    }

    pub(crate) fn finish(&mut self, install_server_ip: String) {
        self.install_server_ip = install_server_ip;
        self.finished_at = Utc::now();
    }

    /// Resources that were created or replaced.
    pub fn changed(&self) -> usize {
        self.networks
            .iter()
            .chain(&self.hosts)
            .filter(|r| matches!(r.outcome, ResourceOutcome::Created | ResourceOutcome::Replaced))
            .count()
    }

    /// Hosts abandoned after a failed remote command.
    pub fn failed_hosts(&self) -> Vec<&str> {
        self.hosts
            .iter()
            .filter(|r| matches!(r.outcome, ResourceOutcome::Failed { .. }))
            .map(|r| r.name.as_str())
            .collect()
    }
}
