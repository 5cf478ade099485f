use chrono::NaiveDateTime;

use shipway_core::{Patch, PatchId};

use crate::driver::{sql_quote, SqlDriver};
use crate::error::{CrashReport, LedgerError};
use crate::genesis::LEDGER_TABLE;

pub const SQL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One live ledger row: a patch that is currently applied.
#[derive(Debug, Clone)]
pub struct LedgerRecord {
    pub name: String,
    pub id: PatchId,
    pub dependencies: Vec<PatchId>,
    pub applied_at: NaiveDateTime,
}

/// Reads and writes the bookkeeping table. Statement order around the actual
/// patch SQL lives in the executor, not here.
pub struct Ledger<'a> {
    driver: &'a dyn SqlDriver,
}

pub(crate) struct RevertTarget {
    pub row_id: u64,
    pub down_sql: Option<String>,
}

impl<'a> Ledger<'a> {
    pub fn new(driver: &'a dyn SqlDriver) -> Self {
        Self { driver }
    }

    pub fn exists(&self) -> Result<bool, LedgerError> {
        let rows = self
            .driver
            .query(&format!("SHOW TABLES LIKE '{LEDGER_TABLE}'"))?;
        Ok(!rows.is_empty())
    }

    /// All live rows, oldest first. Fails with the crash report when any row
    /// records an interrupted update or rollback.
    pub fn load(&self) -> Result<Vec<LedgerRecord>, LedgerError> {
        let rows = self.driver.query(&format!(
            "SELECT patch_name, patch_timestamp, dependencies, applied_at, reverted_at \
             FROM {LEDGER_TABLE} ORDER BY patch_timestamp"
        ))?;

        let mut records = Vec::with_capacity(rows.len());
        let mut report = CrashReport::default();
        for row in rows {
            let [name, timestamp, dependencies, applied_at, reverted_at] = row.as_slice() else {
                return Err(LedgerError::BadRecord {
                    name: LEDGER_TABLE.to_string(),
                    reason: format!("expected 5 columns, got {}", row.len()),
                });
            };
            let name = name.clone().ok_or_else(|| LedgerError::BadRecord {
                name: LEDGER_TABLE.to_string(),
                reason: "patch_name is NULL".to_string(),
            })?;

            if reverted_at.is_some() {
                report.crashed_rollbacks.push(name);
                continue;
            }
            let Some(applied_at) = applied_at else {
                report.crashed_updates.push(name);
                continue;
            };

            records.push(LedgerRecord {
                id: parse_identity(&name, timestamp.as_deref())?,
                dependencies: parse_dependencies(&name, dependencies.as_deref())?,
                applied_at: parse_datetime(&name, applied_at)?,
                name,
            });
        }

        if report.is_empty() {
            Ok(records)
        } else {
            Err(LedgerError::Crashed(report))
        }
    }

    /// Inserts the row before the patch runs, so an interrupted update leaves
    /// a visible trace instead of silence.
    pub(crate) fn insert_pending(&self, patch: &Patch) -> Result<(), LedgerError> {
        let statement = format!(
            "INSERT INTO {LEDGER_TABLE} (patch_name, patch_timestamp, down_sql, dependencies) \
             VALUES ({}, {}, {}, {})",
            sql_quote(&patch.name),
            sql_quote(patch.id.as_str()),
            quote_or_null(&patch.down),
            quote_or_null(&join_dependencies(patch)),
        );
        self.driver.execute(&statement)?;
        Ok(())
    }

    /// Inserts a row that is already applied. Only the embedded ledger patch
    /// takes this path: its own table did not exist before its up ran.
    pub(crate) fn insert_applied(
        &self,
        patch: &Patch,
        at: NaiveDateTime,
    ) -> Result<(), LedgerError> {
        let statement = format!(
            "INSERT INTO {LEDGER_TABLE} (patch_name, patch_timestamp, applied_at) \
             VALUES ({}, {}, {})",
            sql_quote(&patch.name),
            sql_quote(patch.id.as_str()),
            sql_quote(&at.format(SQL_DATETIME_FORMAT).to_string()),
        );
        self.driver.execute(&statement)?;
        Ok(())
    }

    pub(crate) fn mark_applied(&self, name: &str, at: NaiveDateTime) -> Result<(), LedgerError> {
        let statement = format!(
            "UPDATE {LEDGER_TABLE} SET applied_at = {} WHERE patch_name = {}",
            sql_quote(&at.format(SQL_DATETIME_FORMAT).to_string()),
            sql_quote(name),
        );
        self.driver.execute(&statement)?;
        Ok(())
    }

    pub(crate) fn find_revert_target(
        &self,
        name: &str,
    ) -> Result<Option<RevertTarget>, LedgerError> {
        let rows = self.driver.query(&format!(
            "SELECT id, down_sql FROM {LEDGER_TABLE} WHERE patch_name = {} \
             AND applied_at IS NOT NULL ORDER BY applied_at DESC, id DESC LIMIT 1",
            sql_quote(name),
        ))?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        let [row_id, down_sql] = row.as_slice() else {
            return Err(LedgerError::BadRecord {
                name: name.to_string(),
                reason: format!("expected 2 columns, got {}", row.len()),
            });
        };
        let row_id = row_id
            .as_deref()
            .and_then(|raw| raw.parse::<u64>().ok())
            .ok_or_else(|| LedgerError::BadRecord {
                name: name.to_string(),
                reason: "id column is not a number".to_string(),
            })?;
        Ok(Some(RevertTarget {
            row_id,
            down_sql: down_sql.clone(),
        }))
    }

    /// Marks the row before the down action runs; the mark survives a crash.
    pub(crate) fn mark_reverting(&self, row_id: u64, at: NaiveDateTime) -> Result<(), LedgerError> {
        let statement = format!(
            "UPDATE {LEDGER_TABLE} SET reverted_at = {} WHERE id = {row_id}",
            sql_quote(&at.format(SQL_DATETIME_FORMAT).to_string()),
        );
        self.driver.execute(&statement)?;
        Ok(())
    }

    pub(crate) fn delete_row(&self, row_id: u64) -> Result<(), LedgerError> {
        self.driver
            .execute(&format!("DELETE FROM {LEDGER_TABLE} WHERE id = {row_id}"))?;
        Ok(())
    }
}

/// Rows applied inside the half-open window `(after, up_to]`, newest first.
/// This is the revert set for a rollback between two deployments.
pub fn applied_between(
    records: &[LedgerRecord],
    after: NaiveDateTime,
    up_to: NaiveDateTime,
) -> Vec<LedgerRecord> {
    let mut window: Vec<LedgerRecord> = records
        .iter()
        .filter(|record| record.applied_at > after && record.applied_at <= up_to)
        .cloned()
        .collect();
    window.sort_by(|a, b| (b.applied_at, &b.id).cmp(&(a.applied_at, &a.id)));
    window
}

fn join_dependencies(patch: &Patch) -> String {
    patch
        .dependencies()
        .iter()
        .map(|id| id.as_str().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn quote_or_null(value: &str) -> String {
    if value.is_empty() {
        "NULL".to_string()
    } else {
        sql_quote(value)
    }
}

fn parse_identity(name: &str, raw: Option<&str>) -> Result<PatchId, LedgerError> {
    raw.ok_or_else(|| LedgerError::BadRecord {
        name: name.to_string(),
        reason: "patch_timestamp is NULL".to_string(),
    })?
    .parse()
    .map_err(|_| LedgerError::BadRecord {
        name: name.to_string(),
        reason: "patch_timestamp is not a patch identity".to_string(),
    })
}

fn parse_dependencies(name: &str, raw: Option<&str>) -> Result<Vec<PatchId>, LedgerError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(['\n', ','])
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            token.parse().map_err(|_| LedgerError::BadRecord {
                name: name.to_string(),
                reason: format!("dependency '{token}' is not a patch identity"),
            })
        })
        .collect()
}

fn parse_datetime(name: &str, raw: &str) -> Result<NaiveDateTime, LedgerError> {
    NaiveDateTime::parse_from_str(raw, SQL_DATETIME_FORMAT).map_err(|_| LedgerError::BadRecord {
        name: name.to_string(),
        reason: format!("'{raw}' is not a datetime"),
    })
}
