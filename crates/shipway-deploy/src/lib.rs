mod check;
mod command;
mod console;
mod db;
mod manager;
mod release_set;
mod retention;
mod shell;
mod sync;

pub use check::{check_rollback, check_update, MigrationPlan};
pub use command::RemoteCommand;
pub use console::{Console, ListEntry};
pub use db::RemoteSqlDriver;
pub use manager::ReleaseManager;
pub use release_set::ReleaseSet;
pub use retention::{plan_retention, RetentionDecision};
pub use shell::{RemoteShell, ShellError, SshShell};
pub use sync::{FileSync, RsyncSync, SyncError};
