use std::collections::BTreeSet;

use anyhow::{bail, Result};
use serde::Serialize;

use shipway_core::{Patch, PatchId, PatchKind};
use shipway_deploy::ReleaseManager;
use shipway_ledger::{LedgerRecord, SQL_DATETIME_FORMAT};

/// Ledger rows against the patch files on disk. `gone` rows have no file
/// backing them any more; the next deployment will offer to revert them.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub ledger_exists: bool,
    pub applied: Vec<AppliedEntry>,
    pub pending: Vec<PendingEntry>,
    pub gone: Vec<AppliedEntry>,
}

#[derive(Debug, Serialize)]
pub struct AppliedEntry {
    pub name: String,
    pub applied_at: String,
}

#[derive(Debug, Serialize)]
pub struct PendingEntry {
    pub name: String,
    pub kind: PatchKind,
}

pub fn run(manager: &ReleaseManager, json: bool) -> Result<()> {
    if !manager.database_configured() {
        bail!("no database work configured: needs a [database] section and patch_dirs");
    }
    let patches = manager.local_patches()?;
    let records = manager.ledger_records()?;
    let report = build_report(&patches, records.as_deref());

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in render_text(&report) {
            println!("{line}");
        }
    }
    Ok(())
}

pub(crate) fn build_report(
    patches: &[Patch],
    records: Option<&[LedgerRecord]>,
) -> StatusReport {
    let ledger_exists = records.is_some();
    let records = records.unwrap_or_default();

    let on_disk: BTreeSet<&PatchId> = patches.iter().map(|patch| &patch.id).collect();
    let recorded: BTreeSet<&PatchId> = records.iter().map(|record| &record.id).collect();

    let mut applied = Vec::new();
    let mut gone = Vec::new();
    for record in records {
        let entry = AppliedEntry {
            name: record.name.clone(),
            applied_at: record.applied_at.format(SQL_DATETIME_FORMAT).to_string(),
        };
        // The ledger patch never exists as a file; it ships in the binary.
        if on_disk.contains(&record.id) || record.id.is_genesis() {
            applied.push(entry);
        } else {
            gone.push(entry);
        }
    }

    let pending = patches
        .iter()
        .filter(|patch| !recorded.contains(&patch.id))
        .map(|patch| PendingEntry {
            name: patch.name.clone(),
            kind: patch.kind,
        })
        .collect();

    StatusReport {
        ledger_exists,
        applied,
        pending,
        gone,
    }
}

pub(crate) fn render_text(report: &StatusReport) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(if report.ledger_exists {
        "Ledger table: present".to_string()
    } else {
        "Ledger table: missing".to_string()
    });

    if !report.applied.is_empty() {
        lines.push(format!("Applied ({}):", report.applied.len()));
        for entry in &report.applied {
            lines.push(format!("  {}  {}", entry.name, entry.applied_at));
        }
    }
    if !report.pending.is_empty() {
        lines.push(format!("Pending ({}):", report.pending.len()));
        for entry in &report.pending {
            match entry.kind {
                PatchKind::Large => lines.push(format!("  {} [Large]", entry.name)),
                PatchKind::Small => lines.push(format!("  {}", entry.name)),
            }
        }
    }
    if !report.gone.is_empty() {
        lines.push(format!("Gone from disk ({}):", report.gone.len()));
        for entry in &report.gone {
            lines.push(format!("  {}  {}", entry.name, entry.applied_at));
        }
    }
    if report.pending.is_empty() && report.gone.is_empty() {
        lines.push("Nothing to do".to_string());
    }
    lines
}
