use std::fmt;

use shipway_core::{Patch, PatchId};

/// Dependency view of one patch, detached from where it was loaded: apply
/// candidates come from disk, already-performed patches from the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchNode {
    pub id: PatchId,
    pub name: String,
    pub dependencies: Vec<PatchId>,
}

impl From<&Patch> for PatchNode {
    fn from(patch: &Patch) -> Self {
        Self {
            id: patch.id.clone(),
            name: patch.name.clone(),
            dependencies: patch.dependencies(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApplyResolution {
    /// Accepted candidates, every dependency before its dependent.
    pub ordered: Vec<PatchNode>,
    pub skipped: Vec<SkippedApply>,
}

/// A candidate dropped because a dependency exists neither in the ledger nor
/// among the candidates. Reported, never fatal.
#[derive(Debug, Clone)]
pub struct SkippedApply {
    pub patch: PatchNode,
    pub missing_dependency: PatchId,
}

impl fmt::Display for SkippedApply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Can't apply patch '{}', missing dependency '{}'.",
            self.patch.name, self.missing_dependency
        )
    }
}

#[derive(Debug, Clone)]
pub struct RevertResolution {
    /// Candidates cleared to revert, newest first.
    pub ordered: Vec<PatchNode>,
    pub blocked: Vec<BlockedRevert>,
}

/// A candidate that stays applied because a patch outside the revert set
/// depends on it.
#[derive(Debug, Clone)]
pub struct BlockedRevert {
    pub patch: PatchNode,
    pub needed_by: String,
}

impl fmt::Display for BlockedRevert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Can't revert patch '{}' because '{}' needs it.",
            self.patch.name, self.needed_by
        )
    }
}
