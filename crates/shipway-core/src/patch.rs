use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::PatchError;

/// Identity of the patch that creates the ledger table itself. Every other
/// patch implicitly depends on it.
pub const GENESIS_ID: &str = "19700101_000000";

const IDENTITY_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Timestamp identity of a patch, `YYYYMMDD_HHMMSS`. Lexicographic order and
/// chronological order coincide, and that order is the canonical apply order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PatchId {
    raw: String,
    #[serde(skip)]
    timestamp: NaiveDateTime,
}

impl PatchId {
    pub fn genesis() -> Self {
        Self {
            raw: GENESIS_ID.to_string(),
            timestamp: NaiveDateTime::UNIX_EPOCH,
        }
    }

    /// Extracts the identity embedded in a patch file name such as
    /// `sql_20230401_120000_create_users.sql`.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let rest = file_name.strip_prefix("sql_")?;
        if rest.len() < 15 {
            return None;
        }
        let (candidate, tail) = rest.split_at(15);
        if !matches!(tail.chars().next(), None | Some('_') | Some('.')) {
            return None;
        }
        candidate.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn is_genesis(&self) -> bool {
        self.raw == GENESIS_ID
    }
}

impl FromStr for PatchId {
    type Err = PatchError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let well_formed = input.len() == 15
            && input.as_bytes()[8] == b'_'
            && input
                .bytes()
                .enumerate()
                .all(|(index, byte)| index == 8 || byte.is_ascii_digit());
        if !well_formed {
            return Err(PatchError::InvalidIdentity(input.to_string()));
        }

        let timestamp = NaiveDateTime::parse_from_str(input, IDENTITY_FORMAT)
            .map_err(|_| PatchError::InvalidIdentity(input.to_string()))?;
        Ok(Self {
            raw: input.to_string(),
            timestamp,
        })
    }
}

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Advisory size classification. Large patches are highlighted during the
/// check phase so the operator can plan for long-running statements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchKind {
    #[default]
    Small,
    Large,
}

/// One schema patch as parsed from disk. Plain data: the up/down actions are
/// SQL text executed elsewhere, never code.
#[derive(Debug, Clone)]
pub struct Patch {
    pub id: PatchId,
    /// File stem, e.g. `sql_20230401_120000_create_users`.
    pub name: String,
    /// Path relative to the project base dir, as sent to the patch runner.
    pub path: PathBuf,
    pub kind: PatchKind,
    pub active: bool,
    pub up: String,
    pub down: String,
    pub declared_dependencies: Vec<PatchId>,
}

impl Patch {
    /// Declared dependencies with the implicit genesis dependency prepended.
    /// The genesis patch itself depends on nothing.
    pub fn dependencies(&self) -> Vec<PatchId> {
        if self.id.is_genesis() {
            return self.declared_dependencies.clone();
        }

        let mut all = Vec::with_capacity(self.declared_dependencies.len() + 1);
        all.push(PatchId::genesis());
        for dependency in &self.declared_dependencies {
            if !dependency.is_genesis() {
                all.push(dependency.clone());
            }
        }
        all
    }
}
