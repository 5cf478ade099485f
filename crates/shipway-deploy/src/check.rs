use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use chrono::NaiveDateTime;

use shipway_core::{Patch, PatchId, PatchKind};
use shipway_ledger::{applied_between, genesis_patch, LedgerRecord};
use shipway_resolver::{resolve_apply, resolve_revert, PatchNode};

use crate::console::{Console, ListEntry};

/// Database work agreed during the pre-flight check.
#[derive(Debug, Clone, Default)]
pub struct MigrationPlan {
    /// Patches to apply, dependency order.
    pub apply: Vec<Patch>,
    /// Patches to record as done without running their up actions.
    pub register: Vec<Patch>,
    /// Identities to revert, newest first.
    pub revert: Vec<PatchId>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.apply.is_empty() && self.register.is_empty() && self.revert.is_empty()
    }
}

/// The update-side check: compares the patches on disk with the ledger and
/// walks the operator through what to do about the difference. `records` is
/// `None` when the ledger table does not exist yet.
pub fn check_update(
    available: &[Patch],
    records: Option<&[LedgerRecord]>,
    console: &dyn Console,
) -> Result<MigrationPlan> {
    console.say("Check for database updates:");

    let table_exists = records.is_some();
    let records = records.unwrap_or_default();

    let mut performed_ids: BTreeSet<PatchId> =
        records.iter().map(|record| record.id.clone()).collect();
    if table_exists {
        // The table existing at all proves the ledger patch ran.
        performed_ids.insert(PatchId::genesis());
    }

    let mut apply_candidates: Vec<Patch> = Vec::new();
    if !table_exists {
        apply_candidates.push(genesis_patch());
    }
    apply_candidates.extend(
        available
            .iter()
            .filter(|patch| !performed_ids.contains(&patch.id))
            .cloned(),
    );

    // Performed patches whose files are gone from the project may need to
    // come back out, newest first.
    let available_ids: BTreeSet<PatchId> = available.iter().map(|patch| patch.id.clone()).collect();
    let mut revert_candidates: Vec<PatchNode> = records
        .iter()
        .filter(|record| !record.id.is_genesis() && !available_ids.contains(&record.id))
        .map(record_node)
        .collect();
    revert_candidates.sort_by(|a, b| b.id.cmp(&a.id));

    if apply_candidates.is_empty() && revert_candidates.is_empty() {
        console.say("Database is up to date !");
        return Ok(MigrationPlan::default());
    }

    let performed_nodes: Vec<PatchNode> = records.iter().map(record_node).collect();

    let revert = choose_reverts(revert_candidates, &performed_nodes, console);
    let (apply, register) = choose_applies(apply_candidates, &performed_ids, table_exists, console)?;
    Ok(MigrationPlan {
        apply,
        register,
        revert,
    })
}

/// The rollback-side check: everything applied after the release being
/// reactivated went live must come back out.
pub fn check_rollback(
    records: Option<&[LedgerRecord]>,
    previous: NaiveDateTime,
    last: NaiveDateTime,
    console: &dyn Console,
) -> MigrationPlan {
    console.say("Check for database updates:");

    let records = records.unwrap_or_default();
    let window = applied_between(records, previous, last);
    let revert_candidates: Vec<PatchNode> = window
        .iter()
        .filter(|record| !record.id.is_genesis())
        .map(record_node)
        .collect();

    if revert_candidates.is_empty() {
        console.say("Database is up to date !");
        return MigrationPlan::default();
    }

    let performed_nodes: Vec<PatchNode> = records.iter().map(record_node).collect();
    MigrationPlan {
        revert: choose_reverts(revert_candidates, &performed_nodes, console),
        ..MigrationPlan::default()
    }
}

fn record_node(record: &LedgerRecord) -> PatchNode {
    PatchNode {
        id: record.id.clone(),
        name: record.name.clone(),
        dependencies: record.dependencies.clone(),
    }
}

/// Lists the revert candidates that are safe to take out and asks the
/// operator which of them to revert.
fn choose_reverts(
    candidates: Vec<PatchNode>,
    performed: &[PatchNode],
    console: &dyn Console,
) -> Vec<PatchId> {
    let resolution = resolve_revert(&candidates, performed);
    for blocked in &resolution.blocked {
        console.say(&blocked.to_string());
    }
    let cleared = resolution.ordered;
    if cleared.is_empty() {
        return Vec::new();
    }

    let entries: Vec<ListEntry> = cleared
        .iter()
        .map(|node| ListEntry {
            name: node.name.clone(),
            large: false,
        })
        .collect();
    console.list(
        &format!("Database patches to revert ({}):", cleared.len()),
        &entries,
    );

    let choice = if cleared.len() > 1 {
        console.choose("Revert ? (Y/p/n): ", Some('y'), &['y', 'p', 'n'])
    } else {
        console.choose("Revert ? (Y/n): ", Some('y'), &['y', 'n'])
    };

    match choice {
        'y' => cleared.into_iter().map(|node| node.id).collect(),
        'p' => {
            let picked: Vec<PatchNode> = cleared
                .into_iter()
                .filter(|node| {
                    console.choose(&format!("{} (y/n): ", node.name), None, &['y', 'n']) == 'y'
                })
                .collect();
            // A hand-picked subset can strand dependents; keep only what
            // still checks out and let the operator veto the difference.
            let checked = resolve_revert(&picked, performed);
            for blocked in &checked.blocked {
                console.say(&blocked.to_string());
            }
            if !checked.ordered.is_empty()
                && checked.ordered.len() != picked.len()
                && console.choose("Are you sure ? (y/N): ", Some('n'), &['y', 'n']) != 'y'
            {
                return Vec::new();
            }
            checked.ordered.into_iter().map(|node| node.id).collect()
        }
        _ => Vec::new(),
    }
}

/// Lists the applicable patches and asks the operator what to do with them.
/// Returns the apply set and the register-as-done set.
fn choose_applies(
    candidates: Vec<Patch>,
    performed_ids: &BTreeSet<PatchId>,
    table_exists: bool,
    console: &dyn Console,
) -> Result<(Vec<Patch>, Vec<Patch>)> {
    let nodes: Vec<PatchNode> = candidates.iter().map(PatchNode::from).collect();
    let resolution = resolve_apply(&nodes, performed_ids)?;
    for skipped in &resolution.skipped {
        console.say(&skipped.to_string());
    }
    if resolution.ordered.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let by_id: BTreeMap<&PatchId, &Patch> =
        candidates.iter().map(|patch| (&patch.id, patch)).collect();
    let entries: Vec<ListEntry> = resolution
        .ordered
        .iter()
        .map(|node| ListEntry {
            name: node.name.clone(),
            large: by_id
                .get(&node.id)
                .is_some_and(|patch| matches!(patch.kind, PatchKind::Large)),
        })
        .collect();
    console.list(
        &format!("Database patches to apply ({}):", entries.len()),
        &entries,
    );

    // Registering as done needs the ledger table in place.
    let choice = match (table_exists, entries.len() > 1) {
        (true, true) => console.choose(
            "[a]pply, [r]egister as done, [p]ick, [i]gnore (A/r/p/i): ",
            Some('a'),
            &['a', 'r', 'p', 'i'],
        ),
        (true, false) => console.choose(
            "[a]pply, [r]egister as done, [i]gnore (A/r/i): ",
            Some('a'),
            &['a', 'r', 'i'],
        ),
        (false, true) => console.choose(
            "[a]pply, [p]ick, [i]gnore (A/p/i): ",
            Some('a'),
            &['a', 'p', 'i'],
        ),
        (false, false) => console.choose("[a]pply, [i]gnore (A/i): ", Some('a'), &['a', 'i']),
    };

    let ordered_patches = |nodes: &[PatchNode]| -> Vec<Patch> {
        nodes
            .iter()
            .filter_map(|node| by_id.get(&node.id).map(|patch| (*patch).clone()))
            .collect()
    };

    match choice {
        'a' => Ok((ordered_patches(&resolution.ordered), Vec::new())),
        'r' => Ok((Vec::new(), ordered_patches(&resolution.ordered))),
        'p' => {
            let mut picked_apply: Vec<PatchNode> = Vec::new();
            let mut picked_register: Vec<PatchNode> = Vec::new();
            for node in &resolution.ordered {
                let choice = if node.id.is_genesis() {
                    // Nothing else can be recorded until the ledger exists.
                    'a'
                } else {
                    console.choose(&format!("{} (A/r/i): ", node.name), Some('a'), &['a', 'r', 'i'])
                };
                match choice {
                    'a' => picked_apply.push(node.clone()),
                    'r' => picked_register.push(node.clone()),
                    _ => {}
                }
            }

            let mut satisfied = performed_ids.clone();
            satisfied.extend(picked_register.iter().map(|node| node.id.clone()));
            let checked = resolve_apply(&picked_apply, &satisfied)?;
            for skipped in &checked.skipped {
                console.say(&skipped.to_string());
            }
            if !checked.ordered.is_empty()
                && checked.ordered.len() != picked_apply.len()
                && console.choose("Are you sure ? (y/N): ", Some('n'), &['y', 'n']) != 'y'
            {
                return Ok((Vec::new(), Vec::new()));
            }
            Ok((
                ordered_patches(&checked.ordered),
                ordered_patches(&picked_register),
            ))
        }
        _ => Ok((Vec::new(), Vec::new())),
    }
}
