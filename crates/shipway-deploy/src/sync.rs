use std::io;
use std::process::Command;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed launching rsync: {source}")]
    Launch {
        #[source]
        source: io::Error,
    },
    #[error("rsync failed: {message}")]
    Failed { message: String },
}

/// Moves the working tree to the hosts. The manager only talks to this
/// trait; the real implementation shells out to rsync.
pub trait FileSync {
    /// Dry run against the newest deployed release. Returns rsync's change
    /// listing for the operator to inspect.
    fn preview(&self, host: &str, last_dir: &str) -> Result<String, SyncError>;

    /// Uploads the working tree into a fresh release directory, hard-linking
    /// unchanged files from the previous release when one exists.
    fn upload(&self, host: &str, target_dir: &str, last_dir: Option<&str>) -> Result<(), SyncError>;
}

/// Checksum-based rsync: `-c` makes the dry run trustworthy even when
/// mtimes differ between checkouts, `-O` leaves directory times alone so
/// `--delete` does not churn them.
pub struct RsyncSync {
    user: String,
    remote_root: String,
    excludes: Vec<String>,
    data_dirs: Vec<String>,
}

impl RsyncSync {
    pub fn new(user: &str, remote_root: &str, excludes: &[String], data_dirs: &[String]) -> Self {
        Self {
            user: user.to_string(),
            remote_root: remote_root.to_string(),
            excludes: excludes.to_vec(),
            data_dirs: data_dirs.to_vec(),
        }
    }

    /// The full argument list for one transfer, kept separate from process
    /// handling so it can be inspected directly.
    pub fn command_args(
        &self,
        host: &str,
        target_dir: &str,
        copy_dest: Option<&str>,
        dry_run: bool,
    ) -> Vec<String> {
        let mut args = vec!["-azcO".to_string(), "--force".to_string()];
        if dry_run {
            args.push("--dry-run".to_string());
        }
        args.push("--delete".to_string());
        args.push("--progress".to_string());
        for pattern in &self.excludes {
            args.push(format!("--exclude={pattern}"));
        }
        // Data directories live outside the release and are symlinked in.
        for dir in &self.data_dirs {
            args.push(format!("--exclude=/{dir}"));
        }
        if let Some(dir) = copy_dest {
            args.push(format!("--copy-dest={}/{}", self.remote_root, dir));
        }
        args.push("./".to_string());
        args.push(format!("{}@{}:{}/{}", self.user, host, self.remote_root, target_dir));
        args
    }
}

impl FileSync for RsyncSync {
    fn preview(&self, host: &str, last_dir: &str) -> Result<String, SyncError> {
        let args = self.command_args(host, last_dir, None, true);
        debug!(host, "rsync dry run");
        let output = Command::new("rsync")
            .args(&args)
            .output()
            .map_err(|source| SyncError::Launch { source })?;
        if !output.status.success() {
            return Err(SyncError::Failed {
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn upload(&self, host: &str, target_dir: &str, last_dir: Option<&str>) -> Result<(), SyncError> {
        let args = self.command_args(host, target_dir, last_dir, false);
        debug!(host, target_dir, "rsync upload");
        // Progress streams straight to the operator's terminal.
        let status = Command::new("rsync")
            .args(&args)
            .status()
            .map_err(|source| SyncError::Launch { source })?;
        if !status.success() {
            return Err(SyncError::Failed {
                message: format!("exit status {status}"),
            });
        }
        Ok(())
    }
}
