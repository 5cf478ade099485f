use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tracing::{debug, info};

use shipway_core::{
    discover_patches, DatabaseConfig, DeployConfig, DiscoveryOrder, Patch, ReleaseId,
};
use shipway_ledger::{Ledger, LedgerRecord, MysqlParams, SQL_DATETIME_FORMAT};

use crate::check::{check_rollback, check_update, MigrationPlan};
use crate::command::RemoteCommand;
use crate::console::Console;
use crate::db::RemoteSqlDriver;
use crate::release_set::ReleaseSet;
use crate::retention::plan_retention;
use crate::shell::{RemoteShell, ShellError};
use crate::sync::FileSync;

/// The stable symlink every host serves from.
const ACTIVE_LINK: &str = "production";

enum LedgerState {
    NotConfigured,
    NoTable,
    Loaded(Vec<LedgerRecord>),
}

/// Drives a whole deployment, rollback or cleanup against the configured
/// hosts. All remote access goes through the injected shell and sync
/// implementations; the manager itself never spawns a process.
pub struct ReleaseManager<'a> {
    config: &'a DeployConfig,
    base_dir: &'a Path,
    shell: &'a dyn RemoteShell,
    sync: &'a dyn FileSync,
    console: &'a dyn Console,
    timestamp: NaiveDateTime,
}

impl<'a> ReleaseManager<'a> {
    pub fn new(
        config: &'a DeployConfig,
        base_dir: &'a Path,
        shell: &'a dyn RemoteShell,
        sync: &'a dyn FileSync,
        console: &'a dyn Console,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            config,
            base_dir,
            shell,
            sync,
            console,
            timestamp,
        }
    }

    /// Prepares the remote root on the first host and lists what is
    /// deployed there. The other hosts are prepared during the check phase.
    pub fn discover_releases(&self) -> Result<ReleaseSet> {
        let host = self.first_host()?;
        self.prepare_host(host)?;
        let listing = self.shell.run(host, &list_command(&self.config.remote_root))?;
        Ok(ReleaseSet::from_listing(&self.config.project, &listing))
    }

    /// Listing without touching anything; a missing remote root reads as no
    /// deployments yet.
    pub fn list_releases(&self) -> Result<ReleaseSet> {
        let host = self.first_host()?;
        match self.shell.run(host, &list_command(&self.config.remote_root)) {
            Ok(listing) => Ok(ReleaseSet::from_listing(&self.config.project, &listing)),
            Err(ShellError::Failed { .. }) => Ok(ReleaseSet::default()),
            Err(error) => Err(error.into()),
        }
    }

    /// The whole update path: check, sync, migrate, activate, clean up.
    /// Files must exist on every host before schema changes run, and schema
    /// changes must complete before any host is activated.
    pub fn deploy(&self, releases: &ReleaseSet) -> Result<()> {
        let new_release = ReleaseId::new(&self.config.project, self.timestamp);

        let Some(plan) = self.check_update_phase(releases)? else {
            return Ok(());
        };

        for host in &self.config.hosts {
            self.sync_release(host, &new_release, releases.last())?;
        }

        self.run_migrations(&new_release, &plan)?;

        for host in &self.config.hosts {
            self.swap_active_link(host, &new_release)?;
            self.run_hooks(host, &self.config.hooks.post_activate, &new_release)?;
        }
        info!(release = %new_release, "deployment complete");

        self.cleanup()
    }

    /// Reactivates the previous release, then uses the abandoned release's
    /// own patch files to revert what it applied, then removes it.
    pub fn rollback(&self, releases: &ReleaseSet) -> Result<()> {
        let (Some(last), Some(previous)) = (releases.last(), releases.previous()) else {
            self.console
                .say("Rollback impossible, no previous deployment found !");
            return Ok(());
        };

        let Some(plan) = self.check_rollback_phase(previous, last)? else {
            return Ok(());
        };

        for host in &self.config.hosts {
            self.swap_active_link(host, previous)?;
        }

        self.run_migrations(last, &plan)?;

        for host in &self.config.hosts {
            self.run_hooks(host, &self.config.hooks.post_rollback, previous)?;
        }

        for host in &self.config.hosts {
            self.delete_release(host, last)?;
        }
        info!(release = %previous, "rollback complete");
        Ok(())
    }

    /// Retention pass over every host with one aggregate confirmation.
    pub fn cleanup(&self) -> Result<()> {
        let mut doomed: Vec<(String, ReleaseId)> = Vec::new();
        for host in &self.config.hosts {
            let listing = self.shell.run(host, &list_command(&self.config.remote_root))?;
            let releases = ReleaseSet::from_listing(&self.config.project, &listing);
            for (release, decision) in plan_retention(releases.all(), self.timestamp) {
                self.console
                    .say(&format!("{} {}", release.dir_name(), decision.describe()));
                if decision.is_delete() {
                    doomed.push((host.clone(), release));
                }
            }
        }

        if doomed.is_empty() {
            self.console.say("No cleanup needed");
            return Ok(());
        }
        if self
            .console
            .choose("Delete old directories? (y/n) [n]: ", Some('n'), &['y', 'n'])
            != 'y'
        {
            return Ok(());
        }

        for (host, release) in &doomed {
            self.delete_release(host, release)?;
        }
        Ok(())
    }

    /// The report-only check: file preview plus database comparison. Reads
    /// only; nothing on the hosts changes.
    pub fn check(&self, releases: &ReleaseSet) -> Result<MigrationPlan> {
        self.check_update_work(releases)
    }

    /// Patches found in the configured patch directories, canonical order.
    pub fn local_patches(&self) -> Result<Vec<Patch>> {
        let patches = discover_patches(
            self.base_dir,
            &self.config.patch_dirs,
            DiscoveryOrder::OldestFirst,
        )?;
        Ok(patches)
    }

    /// Ledger rows for status reporting; `None` when the table does not
    /// exist yet.
    pub fn ledger_records(&self) -> Result<Option<Vec<LedgerRecord>>> {
        Ok(match self.ledger_state()? {
            LedgerState::Loaded(records) => Some(records),
            _ => None,
        })
    }

    /// Whether this project does database work at all: a `[database]`
    /// section plus at least one patch directory.
    pub fn database_configured(&self) -> bool {
        self.database_enabled().is_some()
    }

    fn check_update_phase(&self, releases: &ReleaseSet) -> Result<Option<MigrationPlan>> {
        // The first host was prepared during discovery.
        for host in self.config.hosts.iter().skip(1) {
            self.prepare_host(host)?;
        }

        let plan = self.check_update_work(releases)?;

        if self
            .console
            .choose("Proceed with deployment? (y/n) [n]: ", Some('n'), &['y', 'n'])
            != 'y'
        {
            return Ok(None);
        }
        Ok(Some(plan))
    }

    fn check_update_work(&self, releases: &ReleaseSet) -> Result<MigrationPlan> {
        let first = self.first_host()?;
        match releases.last() {
            Some(last) => {
                self.console.say("Changed directories and files:");
                let listing = self.sync.preview(first, &last.dir_name())?;
                self.console.say(listing.trim_end());
            }
            None => self.console.say("No deployment history found"),
        }

        match self.ledger_state()? {
            LedgerState::NotConfigured => Ok(MigrationPlan::default()),
            LedgerState::NoTable => check_update(&self.local_patches()?, None, self.console),
            LedgerState::Loaded(records) => {
                check_update(&self.local_patches()?, Some(&records), self.console)
            }
        }
    }

    fn check_rollback_phase(
        &self,
        previous: &ReleaseId,
        last: &ReleaseId,
    ) -> Result<Option<MigrationPlan>> {
        let plan = match self.ledger_state()? {
            LedgerState::NotConfigured => MigrationPlan::default(),
            LedgerState::NoTable => {
                check_rollback(None, previous.timestamp(), last.timestamp(), self.console)
            }
            LedgerState::Loaded(records) => check_rollback(
                Some(&records),
                previous.timestamp(),
                last.timestamp(),
                self.console,
            ),
        };

        if self
            .console
            .choose("Proceed with rollback? (y/n) [n]: ", Some('n'), &['y', 'n'])
            != 'y'
        {
            return Ok(None);
        }
        Ok(Some(plan))
    }

    fn prepare_host(&self, host: &str) -> Result<()> {
        info!(host, root = %self.config.remote_root, "initialize remote directory");
        self.shell.run(
            host,
            &RemoteCommand::program("mkdir")
                .flag("-p")
                .arg(&self.config.remote_root),
        )?;

        if self.config.data_dirs.is_empty() {
            return Ok(());
        }
        let mut command = RemoteCommand::program("mkdir")
            .flag("-v")
            .flag("-m")
            .arg("0775")
            .flag("-p");
        for dir in &self.config.data_dirs {
            command = command.arg(&format!("{}/data/{}", self.config.remote_root, dir));
        }
        self.shell.run(host, &command)?;
        Ok(())
    }

    fn sync_release(&self, host: &str, release: &ReleaseId, last: Option<&ReleaseId>) -> Result<()> {
        info!(host, release = %release, "sync files");
        let last_dir = last.map(ReleaseId::dir_name);
        self.sync
            .upload(host, &release.dir_name(), last_dir.as_deref())?;
        self.fix_data_dirs(host, release)?;
        Ok(())
    }

    /// Data directories are excluded from the upload; each becomes a
    /// relative symlink into the shared tree next to the releases. A data
    /// directory with real content must never be deleted, so only `rmdir`
    /// is ever tried and its failure is ignored.
    fn fix_data_dirs(&self, host: &str, release: &ReleaseId) -> Result<()> {
        let release_path = self.release_path(release);
        for dir in &self.config.data_dirs {
            let cleanup = RemoteCommand::program("cd")
                .arg(&release_path)
                .then(RemoteCommand::program("rmdir").arg(dir));
            if let Err(error) = self.shell.run(host, &cleanup) {
                debug!(host, dir, %error, "no placeholder directory to remove");
            }

            let mut link = RemoteCommand::program("cd").arg(&release_path);
            if let Some((parent, _)) = dir.rsplit_once('/') {
                link = link.then(RemoteCommand::program("mkdir").flag("-p").arg(parent));
            }
            link = link.then(
                RemoteCommand::program("ln")
                    .flag("-sfn")
                    .arg(&data_link_target(dir))
                    .arg(dir),
            );
            self.shell.run(host, &link)?;
        }
        Ok(())
    }

    /// Two-step atomic swap: build the new link aside, then rename it over
    /// the live one. Readers see either the old or the new target, never a
    /// missing link.
    fn swap_active_link(&self, host: &str, release: &ReleaseId) -> Result<()> {
        info!(host, release = %release, "activate");
        let staged = format!("{ACTIVE_LINK}.new");
        let command = RemoteCommand::program("cd")
            .arg(&self.config.remote_root)
            .then(
                RemoteCommand::program("ln")
                    .flag("-sfn")
                    .arg(&release.dir_name())
                    .arg(&staged),
            )
            .then(
                RemoteCommand::program("mv")
                    .flag("-Tf")
                    .arg(&staged)
                    .arg(ACTIVE_LINK),
            );
        self.shell.run(host, &command)?;
        Ok(())
    }

    /// Sends the agreed database work to the control host in three batches:
    /// register-only first, then reverts, then applies.
    fn run_migrations(&self, release: &ReleaseId, plan: &MigrationPlan) -> Result<()> {
        if plan.is_empty() {
            return Ok(());
        }
        let database = self
            .database_enabled()
            .context("database work planned without database configuration")?;
        let release_root = self.release_path(release);

        if !plan.register.is_empty() {
            let files = wire_files(&plan.register);
            let mut command = self.patch_run_command(database, "update", &release_root);
            if !files.is_empty() {
                command = command.flag("--files").arg(&files);
            }
            command = command.flag("--register-only");
            self.shell.run(&database.control_host, &command)?;
        }

        if !plan.revert.is_empty() {
            let identities = plan
                .revert
                .iter()
                .map(|id| id.as_str().to_string())
                .collect::<Vec<_>>()
                .join(",");
            let command = self
                .patch_run_command(database, "rollback", &release_root)
                .flag("--patches")
                .arg(&identities);
            self.shell.run(&database.control_host, &command)?;
        }

        if !plan.apply.is_empty() {
            let files = wire_files(&plan.apply);
            let mut command = self.patch_run_command(database, "update", &release_root);
            if !files.is_empty() {
                command = command.flag("--files").arg(&files);
            }
            self.shell.run(&database.control_host, &command)?;
        }
        Ok(())
    }

    fn patch_run_command(
        &self,
        database: &DatabaseConfig,
        action: &str,
        release_root: &str,
    ) -> RemoteCommand {
        let mut command = RemoteCommand::program("shipway")
            .flag("patch-run")
            .flag("--action")
            .arg(action)
            .flag("--host")
            .arg(&database.host)
            .flag("--port")
            .arg(&database.port.to_string())
            .flag("--user")
            .arg(&database.user);
        if let Some(password) = database.password() {
            command = command.flag("--pass").secret_arg(&password);
        }
        command
            .flag("--database")
            .arg(&database.name)
            .flag("--charset")
            .arg(&database.charset)
            .flag("--root")
            .arg(release_root)
            .flag("--timestamp")
            .arg(&self.timestamp.format(SQL_DATETIME_FORMAT).to_string())
    }

    fn run_hooks(&self, host: &str, hooks: &[String], release: &ReleaseId) -> Result<()> {
        for hook in hooks {
            let rendered = hook
                .replace("{timestamp}", &release.stamp())
                .replace("{release}", &release.dir_name());
            info!(host, hook = rendered.as_str(), "hook");
            let command = RemoteCommand::program("cd")
                .arg(&self.release_path(release))
                .then(RemoteCommand::raw(&rendered));
            self.shell.run(host, &command)?;
        }
        Ok(())
    }

    fn delete_release(&self, host: &str, release: &ReleaseId) -> Result<()> {
        info!(host, release = %release, "delete release directory");
        self.shell.run(
            host,
            &RemoteCommand::program("rm")
                .flag("-rf")
                .arg(&self.release_path(release)),
        )?;
        Ok(())
    }

    fn ledger_state(&self) -> Result<LedgerState> {
        let Some(database) = self.database_enabled() else {
            return Ok(LedgerState::NotConfigured);
        };
        let driver = RemoteSqlDriver::new(self.shell, &database.control_host, mysql_params(database));
        let ledger = Ledger::new(&driver);
        if !ledger.exists()? {
            return Ok(LedgerState::NoTable);
        }
        Ok(LedgerState::Loaded(ledger.load()?))
    }

    /// Database work happens only when a database is configured and there
    /// are patch directories to scan.
    fn database_enabled(&self) -> Option<&DatabaseConfig> {
        match &self.config.database {
            Some(database) if !self.config.patch_dirs.is_empty() => Some(database),
            _ => None,
        }
    }

    fn release_path(&self, release: &ReleaseId) -> String {
        format!("{}/{}", self.config.remote_root, release.dir_name())
    }

    fn first_host(&self) -> Result<&str> {
        self.config
            .hosts
            .first()
            .map(String::as_str)
            .context("no hosts configured")
    }
}

pub(crate) fn mysql_params(database: &DatabaseConfig) -> MysqlParams {
    MysqlParams {
        host: database.host.clone(),
        port: database.port,
        user: database.user.clone(),
        password: database.password(),
        database: database.name.clone(),
        charset: database.charset.clone(),
    }
}

fn list_command(remote_root: &str) -> RemoteCommand {
    RemoteCommand::program("ls").flag("-1").arg(remote_root)
}

/// Comma-joined relative paths for the wire. The genesis patch is embedded
/// in the runner and never travels as a file.
pub(crate) fn wire_files(patches: &[Patch]) -> String {
    patches
        .iter()
        .filter(|patch| !patch.id.is_genesis())
        .map(|patch| patch.path.display().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Relative symlink target pointing from inside the release back out into
/// the shared data tree.
pub(crate) fn data_link_target(dir: &str) -> String {
    let offset = dir.split('/').map(|_| "..").collect::<Vec<_>>().join("/");
    format!("{offset}/data/{dir}")
}
