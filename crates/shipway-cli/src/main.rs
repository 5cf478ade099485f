use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use shipway_core::DeployConfig;
use shipway_deploy::{ReleaseManager, RsyncSync, SshShell};

mod patch_run;
mod render;
mod status;

use patch_run::PatchRunArgs;
use render::{resolve_output_style, OutputStyle, SpinnerSync, TerminalConsole};

#[derive(Parser, Debug)]
#[command(name = "shipway")]
#[command(about = "Atomic release deployment with a schema patch ledger", long_about = None)]
#[command(version)]
struct Cli {
    /// Deployment configuration file.
    #[arg(short, long, default_value = "shipway.toml")]
    config: PathBuf,
    /// Debug-level logging.
    #[arg(short, long)]
    verbose: bool,
    /// No colour, no progress animation.
    #[arg(long)]
    plain: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Deploy the working tree to all configured hosts.
    Deploy,
    /// Reactivate the previous release and revert what the last one applied.
    Rollback,
    /// Delete old release directories per the retention policy.
    Cleanup,
    /// Run the pre-flight check and report; changes nothing on the hosts.
    Check,
    /// Compare the patch ledger with the patch files on disk.
    DbStatus {
        /// Machine-readable report.
        #[arg(long)]
        json: bool,
    },
    /// Plumbing: runs one migration batch, invoked on the control host.
    #[command(hide = true)]
    PatchRun(PatchRunArgs),
    /// Generate a shell completion script.
    Completions { shell: Shell },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let style = resolve_output_style(cli.plain, io::stdout().is_terminal());

    match cli.command {
        Commands::Deploy => with_manager(&cli.config, style, |manager| {
            let releases = manager.discover_releases()?;
            manager.deploy(&releases)
        }),
        Commands::Rollback => with_manager(&cli.config, style, |manager| {
            let releases = manager.discover_releases()?;
            manager.rollback(&releases)
        }),
        Commands::Cleanup => with_manager(&cli.config, style, |manager| manager.cleanup()),
        Commands::Check => with_manager(&cli.config, style, |manager| {
            let releases = manager.list_releases()?;
            manager.check(&releases).map(|_| ())
        }),
        Commands::DbStatus { json } => {
            with_manager(&cli.config, style, |manager| status::run(manager, json))
        }
        Commands::PatchRun(args) => patch_run::run(&args),
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "shipway", &mut io::stdout());
            Ok(())
        }
    }
}

/// Most commands need the same wiring: config, ssh shell, rsync, terminal
/// console, one timestamp for the whole run.
fn with_manager<T>(
    config_path: &Path,
    style: OutputStyle,
    job: impl FnOnce(&ReleaseManager) -> Result<T>,
) -> Result<T> {
    let config = DeployConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let shell = SshShell::new(&config.remote_user);
    let sync = SpinnerSync::new(
        RsyncSync::new(
            &config.remote_user,
            &config.remote_root,
            &config.rsync_excludes,
            &config.data_dirs,
        ),
        style,
    );
    let console = TerminalConsole::new(style);
    let manager = ReleaseManager::new(
        &config,
        Path::new("."),
        &shell,
        &sync,
        &console,
        Local::now().naive_local(),
    );
    job(&manager)
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}
