use std::io;
use std::process::Command;

use thiserror::Error;
use tracing::debug;

use crate::command::RemoteCommand;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed launching ssh to {host}: {source}")]
    Launch {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` on {host} failed: {message}")]
    Failed {
        host: String,
        command: String,
        message: String,
    },
    #[error("`{command}` on {host} produced non-UTF-8 output")]
    BadOutput { host: String, command: String },
}

/// Runs commands on a deployment host. The managers only talk to this trait;
/// how the command reaches the host is the transport's business.
pub trait RemoteShell {
    fn run(&self, host: &str, command: &RemoteCommand) -> Result<String, ShellError>;
}

/// Drives the local `ssh` binary, one connection per command. Key-based
/// login is assumed, as with any unattended rsync/ssh setup.
pub struct SshShell {
    user: String,
}

impl SshShell {
    pub fn new(user: &str) -> Self {
        Self {
            user: user.to_string(),
        }
    }
}

impl RemoteShell for SshShell {
    fn run(&self, host: &str, command: &RemoteCommand) -> Result<String, ShellError> {
        debug!(host, command = command.redacted(), "remote command");
        let output = Command::new("ssh")
            .arg(format!("{}@{}", self.user, host))
            .arg(command.rendered())
            .output()
            .map_err(|source| ShellError::Launch {
                host: host.to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(ShellError::Failed {
                host: host.to_string(),
                command: command.redacted().to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        String::from_utf8(output.stdout).map_err(|_| ShellError::BadOutput {
            host: host.to_string(),
            command: command.redacted().to_string(),
        })
    }
}
