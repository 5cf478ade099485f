use std::collections::BTreeSet;

use shipway_core::PatchId;

use crate::types::{BlockedRevert, PatchNode, RevertResolution};

/// Filters revert candidates down to the set that can actually go.
///
/// A candidate stays applied when some performed patch outside the revert
/// set depends on it. Blocking one candidate can strand another that only
/// looked revertable while the first was still going, so the filter repeats
/// until the set stops shrinking. Candidate order (newest first) survives.
pub fn resolve_revert(candidates: &[PatchNode], performed: &[PatchNode]) -> RevertResolution {
    let mut kept: Vec<PatchNode> = candidates.to_vec();
    let mut blocked: Vec<BlockedRevert> = Vec::new();

    loop {
        let kept_ids: BTreeSet<PatchId> = kept.iter().map(|node| node.id.clone()).collect();
        let mut still_kept: Vec<PatchNode> = Vec::with_capacity(kept.len());
        let mut changed = false;

        for candidate in kept {
            let holder = performed.iter().find(|patch| {
                !kept_ids.contains(&patch.id) && patch.dependencies.contains(&candidate.id)
            });
            match holder {
                Some(holder) => {
                    blocked.push(BlockedRevert {
                        patch: candidate,
                        needed_by: holder.name.clone(),
                    });
                    changed = true;
                }
                None => still_kept.push(candidate),
            }
        }

        kept = still_kept;
        if !changed {
            return RevertResolution {
                ordered: kept,
                blocked,
            };
        }
    }
}
