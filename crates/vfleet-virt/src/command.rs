//! Helpers for running local helper processes (virsh, ssh, scp).

use crate::error::{Result, VirtError};
use std::process::Output;
use tokio::process::Command;

/// Exit status of a process, with the tail of its stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStatus {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// Trailing part of stderr, trimmed.
    pub stderr: String,
}

impl CommandStatus {
    /// A successful status with empty stderr.
    pub fn ok() -> Self {
        Self {
            code: Some(0),
            stderr: String::new(),
        }
    }

    /// A failed status with the given code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    fn from_output(output: &Output) -> Self {
        Self {
            code: output.status.code(),
            stderr: stderr_tail(&output.stderr),
        }
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// Keep error messages bounded.
const MAX_STDERR_BYTES: usize = 1024;

fn stderr_tail(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(MAX_STDERR_BYTES);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}

/// Render a command line for log and error messages.
pub(crate) fn display_command(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Spawn `program` with `args`, wait for it and capture its output.
pub(crate) async fn output(program: &str, args: &[String]) -> Result<Output> {
    tracing::trace!(command = %display_command(program, args), "exec");
    Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| VirtError::Spawn {
            program: program.to_string(),
            source,
        })
}

/// Spawn `program` and report its exit status without judging it.
pub(crate) async fn status(program: &str, args: &[String]) -> Result<CommandStatus> {
    let output = output(program, args).await?;
    Ok(CommandStatus::from_output(&output))
}

/// Spawn `program` and return its stdout, failing on a non-zero exit status.
pub(crate) async fn checked_stdout(program: &str, args: &[String]) -> Result<String> {
    let output = output(program, args).await?;
    if !output.status.success() {
        return Err(VirtError::Command {
            command: display_command(program, args),
            stderr: stderr_tail(&output.stderr),
        });
    }
    String::from_utf8(output.stdout).map_err(|e| VirtError::Parse {
        what: "command output",
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_tail_truncates() {
        let long = vec![b'x'; MAX_STDERR_BYTES * 2];
        assert_eq!(stderr_tail(&long).len(), MAX_STDERR_BYTES);
        assert_eq!(stderr_tail(b"  boom \n"), "boom");
    }

    #[test]
    fn test_display_command() {
        let args = vec!["-q".to_string(), "create".to_string()];
        assert_eq!(display_command("qemu-img", &args), "qemu-img -q create");
    }

    #[test]
    fn test_status_display() {
        assert_eq!(CommandStatus::failed(3, "").to_string(), "exit code 3");
        assert!(CommandStatus::ok().success());
        assert!(!CommandStatus::failed(1, "nope").success());
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let err = status("/nonexistent/vfleet-helper", &[]).await.unwrap_err();
        assert!(matches!(err, VirtError::Spawn { .. }));
    }
}
