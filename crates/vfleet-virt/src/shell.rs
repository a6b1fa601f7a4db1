//! Remote execution channel to the virtualization host.

use crate::command::{self, CommandStatus};
use crate::error::{Result, VirtError};
use async_trait::async_trait;
use std::borrow::Cow;
use std::path::Path;

/// Runs commands and copies files on the virtualization host.
///
/// Implementations only fail when the channel itself cannot be used. The exit
/// status of the remote command is returned to the caller, who decides whether
/// a non-zero status matters.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run a command with arguments on the remote host.
    async fn run(&self, args: &[String]) -> Result<CommandStatus>;

    /// Copy a local file to a path on the remote host.
    async fn copy(&self, local: &Path, remote: &str) -> Result<CommandStatus>;
}

/// [`RemoteShell`] over the `ssh` and `scp` binaries.
///
/// The local user must be able to log in as `user` without a password.
#[derive(Debug, Clone)]
pub struct SshShell {
    user: String,
    host: String,
}

impl SshShell {
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
        }
    }

    /// `user@host` login string.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// `ssh` joins the command words and the remote shell splits them again,
    /// so each word is quoted on its own.
    fn ssh_args(&self, args: &[String]) -> Result<Vec<String>> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(self.destination());
        for arg in args {
            let quoted =
                shlex::try_quote(arg).map_err(|_| VirtError::Unquotable(arg.clone()))?;
            full.push(quoted.into_owned());
        }
        Ok(full)
    }

    /// Legacy `scp` hands the destination to the remote shell while SFTP mode
    /// takes it literally, so only paths that read the same both ways pass.
    fn scp_args(&self, local: &Path, remote: &str) -> Result<Vec<String>> {
        match shlex::try_quote(remote) {
            Ok(Cow::Borrowed(_)) => {}
            _ => return Err(VirtError::Unquotable(remote.to_string())),
        }
        Ok(vec![
            "-q".to_string(),
            "-r".to_string(),
            local.to_string_lossy().to_string(),
            format!("{}:{}", self.destination(), remote),
        ])
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn run(&self, args: &[String]) -> Result<CommandStatus> {
        tracing::debug!(host = %self.host, command = %args.join(" "), "Running remote command");
        command::status("ssh", &self.ssh_args(args)?).await
    }

    async fn copy(&self, local: &Path, remote: &str) -> Result<CommandStatus> {
        tracing::debug!(
            host = %self.host,
            local = %local.display(),
            remote,
            "Copying file to remote host"
        );
        command::status("scp", &self.scp_args(local, remote)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<String> {
        s.split(' ').map(String::from).collect()
    }

    #[test]
    fn test_ssh_args() {
        let shell = SshShell::new("root", "hv1");
        let args = shell.ssh_args(&words("mkdir -p /tmp/x")).unwrap();
        assert_eq!(args, vec!["root@hv1", "mkdir", "-p", "/tmp/x"]);
    }

    #[test]
    fn test_ssh_args_are_quoted() {
        let shell = SshShell::new("root", "hv1");
        let args = shell
            .ssh_args(&[
                "mkdir".to_string(),
                "-p".to_string(),
                "/tmp/db 1_data".to_string(),
                "/tmp/a;reboot".to_string(),
            ])
            .unwrap();
        assert_eq!(args[1], "mkdir");
        assert_ne!(args[3], "/tmp/db 1_data");
        assert_ne!(args[4], "/tmp/a;reboot");
        // The remote shell splits the joined line back into the same words.
        let line = args[1..].join(" ");
        assert_eq!(
            shlex::split(&line).unwrap(),
            vec!["mkdir", "-p", "/tmp/db 1_data", "/tmp/a;reboot"]
        );
    }

    #[test]
    fn test_ssh_args_reject_nul() {
        let shell = SshShell::new("root", "hv1");
        let err = shell.ssh_args(&["echo\0id".to_string()]).unwrap_err();
        assert!(matches!(err, VirtError::Unquotable(_)));
    }

    #[test]
    fn test_scp_args() {
        let shell = SshShell::new("root", "hv1");
        let args = shell
            .scp_args(Path::new("/tmp/local"), "/tmp/remote/user-data")
            .unwrap();
        assert_eq!(
            args,
            vec!["-q", "-r", "/tmp/local", "root@hv1:/tmp/remote/user-data"]
        );
    }

    #[test]
    fn test_scp_args_reject_shell_words() {
        let shell = SshShell::new("root", "hv1");
        for remote in ["/tmp/db 1_data/user-data", "/tmp/a;reboot/user-data", "/tmp/$(id)"] {
            let err = shell.scp_args(Path::new("/tmp/local"), remote).unwrap_err();
            assert!(matches!(err, VirtError::Unquotable(ref p) if p == remote));
        }
    }
}
