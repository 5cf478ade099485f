use std::path::PathBuf;

use shipway_core::{Patch, PatchId, PatchKind};

pub const LEDGER_TABLE: &str = "db_patches";

pub(crate) const GENESIS_NAME: &str = "sql_19700101_000000_patch_ledger";

const GENESIS_UP: &str = "\
CREATE TABLE db_patches (
    id INT UNSIGNED NOT NULL AUTO_INCREMENT,
    patch_name VARCHAR(400) NOT NULL,
    patch_timestamp VARCHAR(15) NOT NULL,
    down_sql TEXT NULL,
    dependencies TEXT NULL,
    applied_at DATETIME NULL,
    reverted_at DATETIME NULL,
    PRIMARY KEY (id),
    UNIQUE KEY uniq_patch_name (patch_name)
) ENGINE=InnoDB;";

/// The patch that creates the ledger table. It ships inside the binary
/// rather than as a file, so it is applicable before any bookkeeping exists
/// and can never be missing from a checkout. It has no down action.
pub fn genesis_patch() -> Patch {
    Patch {
        id: PatchId::genesis(),
        name: GENESIS_NAME.to_string(),
        // Never read: the embedded patch is not sent to the patch runner.
        path: PathBuf::new(),
        kind: PatchKind::Small,
        active: true,
        up: GENESIS_UP.to_string(),
        down: String::new(),
        declared_dependencies: Vec::new(),
    }
}
