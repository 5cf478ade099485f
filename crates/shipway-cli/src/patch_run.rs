use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use clap::{Args, ValueEnum};
use tracing::{info, warn};

use shipway_core::{load_patch, Patch, PatchId};
use shipway_ledger::{
    genesis_patch, MysqlParams, MysqlShellDriver, PatchExecutor, RevertOutcome,
    SQL_DATETIME_FORMAT,
};

/// Everything the controller knows, passed explicitly: the control host has
/// no config file and no clock of record.
#[derive(Args, Debug)]
pub struct PatchRunArgs {
    #[arg(long, value_enum)]
    pub action: PatchRunAction,
    /// Database server, as reachable from this host.
    #[arg(long)]
    pub host: String,
    #[arg(long, default_value_t = 3306)]
    pub port: u16,
    #[arg(long)]
    pub user: String,
    #[arg(long)]
    pub pass: Option<String>,
    #[arg(long)]
    pub database: String,
    #[arg(long, default_value = "utf8mb4")]
    pub charset: String,
    /// Release directory the patch file paths are relative to.
    #[arg(long)]
    pub root: PathBuf,
    /// Controller clock, `YYYY-MM-DD HH:MM:SS`; stamps every ledger write.
    #[arg(long)]
    pub timestamp: String,
    /// Comma-separated patch files to apply, relative to the root.
    #[arg(long)]
    pub files: Option<String>,
    /// Comma-separated patch identities to revert, newest first.
    #[arg(long)]
    pub patches: Option<String>,
    /// Book the patches as done without running their up actions.
    #[arg(long)]
    pub register_only: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchRunAction {
    Update,
    Rollback,
}

pub fn run(args: &PatchRunArgs) -> Result<()> {
    let timestamp = NaiveDateTime::parse_from_str(&args.timestamp, SQL_DATETIME_FORMAT)
        .with_context(|| format!("bad --timestamp '{}'", args.timestamp))?;
    let driver = MysqlShellDriver::new(MysqlParams {
        host: args.host.clone(),
        port: args.port,
        user: args.user.clone(),
        password: args.pass.clone(),
        database: args.database.clone(),
        charset: args.charset.clone(),
    });
    let executor = PatchExecutor::new(&driver, timestamp);

    match args.action {
        PatchRunAction::Update => {
            let files = parse_files(args.files.as_deref().unwrap_or_default());
            run_update(&executor, &args.root, &files, args.register_only)
        }
        PatchRunAction::Rollback => {
            let identities =
                parse_identities(args.patches.as_deref().context("--patches is required")?)?;
            run_rollback(&executor, &identities)
        }
    }
}

/// Applies (or registers) the named patch files in the order given. When
/// the ledger table is missing, the embedded patch that creates it runs
/// first; when it exists, loading it first surfaces any crashed rows before
/// new work starts.
pub(crate) fn run_update(
    executor: &PatchExecutor,
    root: &Path,
    files: &[PathBuf],
    register_only: bool,
) -> Result<()> {
    let mut patches: Vec<Patch> = Vec::new();
    if executor.ledger().exists().context("reading the patch ledger")? {
        executor.ledger().load().context("reading the patch ledger")?;
    } else {
        patches.push(genesis_patch());
    }

    for rel_path in files {
        let patch = load_patch(root, rel_path)
            .with_context(|| format!("loading patch file {}", rel_path.display()))?;
        if !patch.active {
            bail!("patch '{}' is marked inactive", patch.name);
        }
        patches.push(patch);
    }

    for patch in &patches {
        info!(patch = patch.name.as_str(), register_only, "apply");
        executor
            .apply(patch, register_only)
            .with_context(|| format!("failed applying patch '{}'", patch.name))?;
    }
    Ok(())
}

/// Reverts the identified patches in the order given (newest first). An
/// identity with no ledger row is reported and skipped; so is a row without
/// a recorded down action. The rest of the batch proceeds either way.
pub(crate) fn run_rollback(executor: &PatchExecutor, identities: &[PatchId]) -> Result<()> {
    let records = executor.ledger().load().context("reading the patch ledger")?;

    for identity in identities {
        let Some(record) = records.iter().find(|record| &record.id == identity) else {
            warn!(patch = identity.as_str(), "not in the ledger, nothing to revert");
            continue;
        };
        let outcome = executor
            .revert(&record.name)
            .with_context(|| format!("failed reverting patch '{}'", record.name))?;
        match outcome {
            RevertOutcome::Reverted => info!(patch = record.name.as_str(), "reverted"),
            RevertOutcome::NotRecorded => {
                warn!(patch = record.name.as_str(), "no live ledger row, skipped")
            }
            RevertOutcome::NoDownAction => {
                warn!(patch = record.name.as_str(), "no down action recorded, left in place")
            }
        }
    }
    Ok(())
}

pub(crate) fn parse_files(csv: &str) -> Vec<PathBuf> {
    csv.split(',')
        .filter(|token| !token.is_empty())
        .map(PathBuf::from)
        .collect()
}

pub(crate) fn parse_identities(csv: &str) -> Result<Vec<PatchId>> {
    csv.split(',')
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse()
                .with_context(|| format!("bad patch identity '{token}'"))
        })
        .collect()
}
