//! Service process control over `ssh`.
//!
//! Password authentication goes through `sshpass -e` (password passed in the
//! `SSHPASS` environment variable, never on the command line); members
//! without a password rely on key-based auth in batch mode.

use eddy_types::{ClusterMember, Credentials, MemberId};
use tokio::process::Command;
use tracing::debug;

use crate::error::ClusterError;

/// Port the remote shell connects to.
pub const SSH_PORT: u16 = 22;

/// Shell commands that start and stop a member's service process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCommands {
    pub start: String,
    pub stop: String,
}

impl ServiceCommands {
    /// Init-script commands for a primary data store member.
    pub fn primary_default() -> Self {
        Self {
            start: "/etc/init.d/couchbase-server start".to_string(),
            stop: "/etc/init.d/couchbase-server stop".to_string(),
        }
    }

    /// Daemonized start and process kill for an index member.
    pub fn index_default() -> Self {
        Self {
            start: "elasticsearch/bin/elasticsearch -d".to_string(),
            stop: "pkill -f elasticsearch".to_string(),
        }
    }
}

/// Runs one-shot commands on a member host.
#[derive(Debug, Clone)]
pub struct RemoteShell {
    member: MemberId,
    credentials: Credentials,
    port: u16,
}

impl RemoteShell {
    /// Shell for `member`, or `None` if it has no shell credentials.
    pub fn for_member(member: &ClusterMember) -> Option<Self> {
        member.shell.as_ref().map(|credentials| Self {
            member: member.id.clone(),
            credentials: credentials.clone(),
            port: SSH_PORT,
        })
    }

    /// Arguments passed to `ssh` for `command`.
    pub fn ssh_args(&self, command: &str) -> Vec<String> {
        vec![
            "-p".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            format!("{}@{}", self.credentials.username, self.member.host),
            command.to_string(),
        ]
    }

    /// Run `command` and return its stdout. A non-zero exit is an error.
    pub async fn run(&self, command: &str) -> Result<String, ClusterError> {
        let mut cmd = if self.credentials.password.is_empty() {
            let mut cmd = Command::new("ssh");
            cmd.args(["-o", "BatchMode=yes"]);
            cmd
        } else {
            let mut cmd = Command::new("sshpass");
            cmd.arg("-e")
                .arg("ssh")
                .env("SSHPASS", &self.credentials.password);
            cmd
        };
        cmd.args(self.ssh_args(command)).kill_on_drop(true);

        debug!(member = %self.member, command, "running remote command");
        let output = cmd.output().await.map_err(|e| ClusterError::Remote {
            member: self.member.clone(),
            command: command.to_string(),
            reason: e.to_string(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClusterError::Remote {
                member: self.member.clone(),
                command: command.to_string(),
                reason: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
