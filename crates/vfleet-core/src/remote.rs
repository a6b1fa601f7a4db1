//! Remote command execution under a failure policy.

use crate::config::RemoteFailurePolicy;
use crate::error::{CoreError, Result};
use std::path::Path;
use vfleet_virt::{CommandStatus, RemoteShell};

/// Runs provisioning commands for one host and applies the failure policy
/// to their exit statuses.
///
/// Under [`RemoteFailurePolicy::Ignore`] a failed command is logged and
/// reported as success. Under the other policies it becomes
/// [`CoreError::RemoteCommandFailed`]; telling `Abort` and `SkipHost` apart is
/// the caller's business. A command that cannot be spawned is always an error.
pub struct RemoteRunner<'a> {
    shell: &'a dyn RemoteShell,
    policy: RemoteFailurePolicy,
    host: &'a str,
}

impl<'a> RemoteRunner<'a> {
    pub fn new(shell: &'a dyn RemoteShell, policy: RemoteFailurePolicy, host: &'a str) -> Self {
        Self {
            shell,
            policy,
            host,
        }
    }

    /// Run a command on the target host.
    pub async fn run(&self, args: &[String]) -> Result<()> {
        let command = args.join(" ");
        tracing::debug!(host = %self.host, %command, "Running remote command");
        let status = self.shell.run(args).await?;
        self.check(command, status)
    }

    /// Copy a local file to the target host.
    pub async fn copy(&self, local: &Path, remote: &str) -> Result<()> {
        let command = format!("scp {} {}", local.display(), remote);
        tracing::debug!(host = %self.host, %remote, "Copying file to target");
        let status = self.shell.copy(local, remote).await?;
        self.check(command, status)
    }

    fn check(&self, command: String, status: CommandStatus) -> Result<()> {
        if status.success() {
            return Ok(());
        }
        if self.policy == RemoteFailurePolicy::Ignore {
            tracing::warn!(
                host = %self.host,
                %command,
                %status,
                stderr = %status.stderr,
                "Remote command failed, continuing"
            );
            return Ok(());
        }
        Err(CoreError::RemoteCommandFailed {
            host: self.host.to_string(),
            command,
            status: status.to_string(),
            stderr: status.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vfleet_virt::mock::MockShell;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[tokio::test]
    async fn test_success_passes() {
        let shell = MockShell::new();
        let runner = RemoteRunner::new(&shell, RemoteFailurePolicy::Abort, "node1");
        runner.run(&args("mkdir -p /tmp/x")).await.unwrap();
        assert_eq!(shell.commands(), vec![args("mkdir -p /tmp/x")]);
    }

    #[tokio::test]
    async fn test_ignore_swallows_failure() {
        let shell = MockShell::new();
        shell.fail_program("qemu-img", CommandStatus::failed(1, "no space"));
        let runner = RemoteRunner::new(&shell, RemoteFailurePolicy::Ignore, "node1");
        assert!(runner.run(&args("qemu-img create x 1G")).await.is_ok());
    }

    #[tokio::test]
    async fn test_abort_reports_failure() {
        let shell = MockShell::new();
        shell.fail_program("qemu-img", CommandStatus::failed(1, "no space"));
        let runner = RemoteRunner::new(&shell, RemoteFailurePolicy::Abort, "node1");
        match runner.run(&args("qemu-img create x 1G")).await {
            Err(CoreError::RemoteCommandFailed {
                host,
                command,
                status,
                stderr,
            }) => {
                assert_eq!(host, "node1");
                assert_eq!(command, "qemu-img create x 1G");
                assert_eq!(status, "exit code 1");
                assert_eq!(stderr, "no space");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_copy_failure_under_skip_host() {
        let shell = MockShell::new();
        shell.fail_program("scp", CommandStatus::failed(255, "connection refused"));
        let runner = RemoteRunner::new(&shell, RemoteFailurePolicy::SkipHost, "router");
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = runner.copy(file.path(), "/tmp/x/user-data").await.unwrap_err();
        assert!(matches!(err, CoreError::RemoteCommandFailed { .. }));
    }
}
