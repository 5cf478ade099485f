use std::collections::BTreeSet;
use std::path::PathBuf;

use shipway_core::{Patch, PatchId, PatchKind};

use super::*;

fn id(raw: &str) -> PatchId {
    raw.parse().expect("patch identity should parse")
}

fn node(raw: &str, dependencies: &[&str]) -> PatchNode {
    PatchNode {
        id: id(raw),
        name: format!("sql_{raw}_patch"),
        dependencies: dependencies.iter().map(|dep| id(dep)).collect(),
    }
}

fn performed(ids: &[&str]) -> BTreeSet<PatchId> {
    ids.iter().map(|raw| id(raw)).collect()
}

fn ordered_ids(resolution: &ApplyResolution) -> Vec<&str> {
    resolution
        .ordered
        .iter()
        .map(|node| node.id.as_str())
        .collect()
}

#[test]
fn apply_keeps_already_valid_order() {
    let candidates = vec![
        node("20230101_000000", &[]),
        node("20230201_000000", &["20230101_000000"]),
        node("20230301_000000", &[]),
    ];

    let resolution =
        resolve_apply(&candidates, &performed(&[])).expect("resolution should succeed");
    assert_eq!(
        ordered_ids(&resolution),
        vec!["20230101_000000", "20230201_000000", "20230301_000000"]
    );
    assert!(resolution.skipped.is_empty());
}

#[test]
fn apply_moves_dependent_after_dependency() {
    let candidates = vec![
        node("20230201_000000", &["20230101_000000"]),
        node("20230101_000000", &[]),
    ];

    let resolution =
        resolve_apply(&candidates, &performed(&[])).expect("resolution should succeed");
    assert_eq!(
        ordered_ids(&resolution),
        vec!["20230101_000000", "20230201_000000"]
    );
}

#[test]
fn apply_orders_fully_reversed_chain() {
    // Worst case that is still acyclic: every reorder pass moves one link.
    let candidates = vec![
        node("20230301_000000", &["20230201_000000"]),
        node("20230201_000000", &["20230101_000000"]),
        node("20230101_000000", &[]),
    ];

    let resolution =
        resolve_apply(&candidates, &performed(&[])).expect("resolution should succeed");
    assert_eq!(
        ordered_ids(&resolution),
        vec!["20230101_000000", "20230201_000000", "20230301_000000"]
    );
}

#[test]
fn apply_accepts_dependency_already_performed() {
    let candidates = vec![node("20230201_000000", &["20230101_000000"])];

    let resolution = resolve_apply(&candidates, &performed(&["20230101_000000"]))
        .expect("resolution should succeed");
    assert_eq!(ordered_ids(&resolution), vec!["20230201_000000"]);
}

#[test]
fn apply_skips_candidate_with_missing_dependency() {
    let candidates = vec![
        node("20230101_000000", &[]),
        node("20230201_000000", &["20221201_000000"]),
    ];

    let resolution =
        resolve_apply(&candidates, &performed(&[])).expect("resolution should succeed");
    assert_eq!(ordered_ids(&resolution), vec!["20230101_000000"]);
    assert_eq!(resolution.skipped.len(), 1);
    assert_eq!(
        resolution.skipped[0].to_string(),
        "Can't apply patch 'sql_20230201_000000_patch', missing dependency '20221201_000000'."
    );
}

#[test]
fn apply_drops_dependents_of_skipped_candidates() {
    let candidates = vec![
        node("20230101_000000", &["20221201_000000"]),
        node("20230201_000000", &["20230101_000000"]),
    ];

    let resolution =
        resolve_apply(&candidates, &performed(&[])).expect("resolution should succeed");
    assert!(resolution.ordered.is_empty());
    assert_eq!(resolution.skipped.len(), 2);
    assert_eq!(
        resolution.skipped[1].missing_dependency,
        id("20230101_000000")
    );
}

#[test]
fn apply_detects_dependency_cycle() {
    let candidates = vec![
        node("20230101_000000", &["20230201_000000"]),
        node("20230201_000000", &["20230101_000000"]),
    ];

    let err = resolve_apply(&candidates, &performed(&[])).expect_err("cycle must fail");
    let message = err.to_string();
    assert!(
        message.contains("dependency cycle detected"),
        "unexpected error: {message}"
    );
    assert!(message.contains("sql_20230101_000000_patch"));
    assert!(message.contains("sql_20230201_000000_patch"));
}

#[test]
fn apply_detects_self_dependency() {
    let candidates = vec![node("20230101_000000", &["20230101_000000"])];

    let err = resolve_apply(&candidates, &performed(&[])).expect_err("cycle must fail");
    assert!(err.to_string().contains("dependency cycle detected"));
}

#[test]
fn apply_requires_ledger_patch_unless_present() {
    // Synthetic node with the implicit ledger dependency and nothing to
    // satisfy it: the candidate drops out.
    let candidates = vec![node("20230101_000000", &["19700101_000000"])];
    let resolution =
        resolve_apply(&candidates, &performed(&[])).expect("resolution should succeed");
    assert!(resolution.ordered.is_empty());
    assert_eq!(
        resolution.skipped[0].missing_dependency,
        PatchId::genesis()
    );

    // With the ledger creation patch in front everything applies.
    let candidates = vec![
        node("20230101_000000", &["19700101_000000"]),
        node("19700101_000000", &[]),
    ];
    let resolution =
        resolve_apply(&candidates, &performed(&[])).expect("resolution should succeed");
    assert_eq!(
        ordered_ids(&resolution),
        vec!["19700101_000000", "20230101_000000"]
    );
}

#[test]
fn patch_node_carries_implicit_genesis_dependency() {
    let patch = Patch {
        id: id("20230401_120000"),
        name: "sql_20230401_120000_create_users".to_string(),
        path: PathBuf::from("database/sql_20230401_120000_create_users.sql"),
        kind: PatchKind::Small,
        active: true,
        up: "CREATE TABLE users (id INT);".to_string(),
        down: String::new(),
        declared_dependencies: vec![id("20230101_000000")],
    };

    let node = PatchNode::from(&patch);
    assert_eq!(
        node.dependencies,
        vec![PatchId::genesis(), id("20230101_000000")]
    );
}

#[test]
fn revert_blocks_patch_needed_by_survivor() {
    let candidates = vec![node("20230101_000000", &[])];
    let performed = vec![
        node("20230101_000000", &[]),
        node("20230201_000000", &["20230101_000000"]),
    ];

    let resolution = resolve_revert(&candidates, &performed);
    assert!(resolution.ordered.is_empty());
    assert_eq!(resolution.blocked.len(), 1);
    assert_eq!(
        resolution.blocked[0].to_string(),
        "Can't revert patch 'sql_20230101_000000_patch' because 'sql_20230201_000000_patch' needs it."
    );
}

#[test]
fn revert_allows_dependency_when_dependent_reverts_too() {
    let candidates = vec![
        node("20230201_000000", &["20230101_000000"]),
        node("20230101_000000", &[]),
    ];
    let performed = vec![
        node("20230101_000000", &[]),
        node("20230201_000000", &["20230101_000000"]),
    ];

    let resolution = resolve_revert(&candidates, &performed);
    assert!(resolution.blocked.is_empty());
    assert_eq!(
        resolution
            .ordered
            .iter()
            .map(|node| node.id.as_str())
            .collect::<Vec<_>>(),
        vec!["20230201_000000", "20230101_000000"]
    );
}

#[test]
fn revert_strands_dependencies_of_blocked_candidates() {
    // An outside patch pins the newest candidate; once that candidate stays,
    // the older one it depends on has to stay as well.
    let candidates = vec![
        node("20230201_000000", &["20230101_000000"]),
        node("20230101_000000", &[]),
    ];
    let performed = vec![
        node("20230101_000000", &[]),
        node("20230201_000000", &["20230101_000000"]),
        node("20230301_000000", &["20230201_000000"]),
    ];

    let resolution = resolve_revert(&candidates, &performed);
    assert!(resolution.ordered.is_empty());
    assert_eq!(resolution.blocked.len(), 2);
    assert_eq!(
        resolution.blocked[0].needed_by,
        "sql_20230301_000000_patch"
    );
    assert_eq!(
        resolution.blocked[1].needed_by,
        "sql_20230201_000000_patch"
    );
}
