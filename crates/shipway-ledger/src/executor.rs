use chrono::NaiveDateTime;

use shipway_core::Patch;

use crate::driver::SqlDriver;
use crate::error::LedgerError;
use crate::ledger::Ledger;

/// How one revert ended. Skips are reported and the batch moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertOutcome {
    Reverted,
    /// No live ledger row carries this name.
    NotRecorded,
    /// The row exists but recorded no down action at apply time.
    NoDownAction,
}

/// Runs patches against the database with the bookkeeping in crash-safe
/// order. Patch bodies execute inside a transaction while the ledger
/// statements around them stay outside it. All timestamps come from the
/// caller, so one clock stamps a whole deployment no matter which machine
/// executes the statements.
pub struct PatchExecutor<'a> {
    driver: &'a dyn SqlDriver,
    ledger: Ledger<'a>,
    timestamp: NaiveDateTime,
}

impl<'a> PatchExecutor<'a> {
    pub fn new(driver: &'a dyn SqlDriver, timestamp: NaiveDateTime) -> Self {
        Self {
            driver,
            ledger: Ledger::new(driver),
            timestamp,
        }
    }

    pub fn ledger(&self) -> &Ledger<'a> {
        &self.ledger
    }

    /// Applies one patch. The pending row goes in first, so a crash inside
    /// the up action leaves a row without an applied timestamp. Registering
    /// only skips the up action but books the patch all the same.
    pub fn apply(&self, patch: &Patch, register_only: bool) -> Result<(), LedgerError> {
        if patch.id.is_genesis() {
            // No table to book into yet. Run the DDL, then record the patch
            // as applied in the table it just created.
            self.driver.execute_transactional(&patch.up)?;
            return self.ledger.insert_applied(patch, self.timestamp);
        }

        self.ledger.insert_pending(patch)?;
        if !register_only && !patch.up.is_empty() {
            self.driver.execute_transactional(&patch.up)?;
        }
        self.ledger.mark_applied(&patch.name, self.timestamp)
    }

    /// Reverts one patch by name, using the down action recorded in the
    /// ledger at apply time. The revert mark goes in before the down action,
    /// so a crash inside it leaves a row with a revert timestamp; the row
    /// only disappears once the down action went through.
    pub fn revert(&self, name: &str) -> Result<RevertOutcome, LedgerError> {
        let Some(target) = self.ledger.find_revert_target(name)? else {
            return Ok(RevertOutcome::NotRecorded);
        };
        let Some(down_sql) = target.down_sql.filter(|down| !down.trim().is_empty()) else {
            return Ok(RevertOutcome::NoDownAction);
        };

        self.ledger.mark_reverting(target.row_id, self.timestamp)?;
        self.driver.execute_transactional(&down_sql)?;
        self.ledger.delete_row(target.row_id)?;
        Ok(RevertOutcome::Reverted)
    }
}
