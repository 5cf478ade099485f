mod driver;
mod error;
mod executor;
mod genesis;
mod ledger;

pub use driver::{parse_batch_output, MysqlParams, MysqlShellDriver, SqlDriver, SqlError};
pub use error::{CrashReport, LedgerError};
pub use executor::{PatchExecutor, RevertOutcome};
pub use genesis::{genesis_patch, LEDGER_TABLE};
pub use ledger::{applied_between, Ledger, LedgerRecord, SQL_DATETIME_FORMAT};

#[cfg(test)]
mod tests;
