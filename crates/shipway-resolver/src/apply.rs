use std::collections::BTreeSet;

use shipway_core::PatchId;

use crate::error::ResolveError;
use crate::types::{ApplyResolution, PatchNode, SkippedApply};

enum Verdict {
    Accept,
    MoveAfter(usize),
    Missing(PatchId),
}

/// Orders apply candidates so every dependency runs before its dependent.
///
/// Candidates arrive oldest first. A dependency counts as satisfied when it
/// was already performed or accepted earlier in the current pass. A
/// dependency sitting further down the candidate list pulls its dependent
/// down to the slot right behind it and the pass starts over; more
/// reorderings than there are candidates means the declarations form a
/// cycle. A dependency that exists nowhere drops the dependent with a
/// diagnostic and the scan carries on.
pub fn resolve_apply(
    candidates: &[PatchNode],
    performed: &BTreeSet<PatchId>,
) -> Result<ApplyResolution, ResolveError> {
    let mut pending: Vec<PatchNode> = candidates.to_vec();
    let mut skipped: Vec<SkippedApply> = Vec::new();
    let reorder_cap = pending.len();
    let mut reorders = 0;

    'pass: loop {
        let mut satisfied: BTreeSet<PatchId> = BTreeSet::new();
        let mut index = 0;
        while index < pending.len() {
            let mut verdict = Verdict::Accept;
            for dependency in &pending[index].dependencies {
                if performed.contains(dependency) || satisfied.contains(dependency) {
                    continue;
                }
                match pending.iter().position(|other| &other.id == dependency) {
                    Some(position) if position > index => {
                        verdict = Verdict::MoveAfter(position);
                        break;
                    }
                    // A patch depending on itself lands here; the reorder is
                    // a no-op and the cap turns it into a cycle error.
                    Some(_) => {
                        verdict = Verdict::MoveAfter(index);
                        break;
                    }
                    None => {
                        verdict = Verdict::Missing(dependency.clone());
                        break;
                    }
                }
            }

            match verdict {
                Verdict::Accept => {
                    satisfied.insert(pending[index].id.clone());
                    index += 1;
                }
                Verdict::MoveAfter(position) => {
                    reorders += 1;
                    if reorders > reorder_cap {
                        let mut names: Vec<String> = pending
                            .iter()
                            .skip(index)
                            .map(|node| node.name.clone())
                            .collect();
                        names.sort();
                        return Err(ResolveError::DependencyCycle(names));
                    }
                    let moved = pending.remove(index);
                    pending.insert(position, moved);
                    continue 'pass;
                }
                Verdict::Missing(dependency) => {
                    let patch = pending.remove(index);
                    skipped.push(SkippedApply {
                        patch,
                        missing_dependency: dependency,
                    });
                }
            }
        }

        // A full pass without a reorder: what remains is the final order.
        return Ok(ApplyResolution {
            ordered: pending,
            skipped,
        });
    }
}
