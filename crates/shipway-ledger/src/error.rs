use std::fmt;

use thiserror::Error;

use crate::driver::SqlError;

/// Ledger rows left behind by an interrupted run. A row without an applied
/// timestamp died during an update, a row with a revert timestamp died
/// during a rollback. Either one blocks everything until cleaned up by hand.
#[derive(Debug, Clone, Default)]
pub struct CrashReport {
    pub crashed_updates: Vec<String>,
    pub crashed_rollbacks: Vec<String>,
}

impl CrashReport {
    pub fn is_empty(&self) -> bool {
        self.crashed_updates.is_empty() && self.crashed_rollbacks.is_empty()
    }
}

impl fmt::Display for CrashReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = Vec::new();
        if let Some(line) = describe(&self.crashed_updates, "update") {
            lines.push(line);
        }
        if let Some(line) = describe(&self.crashed_rollbacks, "rollback") {
            lines.push(line);
        }
        f.write_str(&lines.join("\n"))
    }
}

fn describe(names: &[String], phase: &str) -> Option<String> {
    match names {
        [] => None,
        [single] => Some(format!("Patch {single} has crashed at previous {phase} !")),
        many => Some(format!(
            "Patches {} have crashed at previous {phase} !",
            many.join(", ")
        )),
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Sql(#[from] SqlError),
    #[error("{0}")]
    Crashed(CrashReport),
    #[error("ledger row for {name} is unreadable: {reason}")]
    BadRecord { name: String, reason: String },
}
