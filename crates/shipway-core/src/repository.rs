use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PatchError;
use crate::patch::{Patch, PatchId};
use crate::patch_file::parse_patch_file;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOrder {
    /// Canonical apply order.
    OldestFirst,
    /// Revert order.
    NewestFirst,
}

/// Scans the configured patch directories for `sql_YYYYMMDD_HHMMSS*.sql`
/// files. Inactive patches are dropped, malformed ones are an error, and so
/// is the same identity appearing twice anywhere in the scanned set.
pub fn discover_patches(
    base_dir: &Path,
    patch_dirs: &[String],
    order: DiscoveryOrder,
) -> Result<Vec<Patch>, PatchError> {
    let mut seen: BTreeMap<PatchId, PathBuf> = BTreeMap::new();
    let mut found: BTreeMap<PatchId, Patch> = BTreeMap::new();

    for patch_dir in patch_dirs {
        let dir_path = base_dir.join(patch_dir);
        let entries = fs::read_dir(&dir_path).map_err(|source| PatchError::ReadDir {
            path: dir_path.clone(),
            source,
        })?;

        for entry in entries {
            let entry = entry.map_err(|source| PatchError::ReadDir {
                path: dir_path.clone(),
                source,
            })?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if !file_name.ends_with(".sql") {
                continue;
            }
            let Some(id) = PatchId::from_file_name(file_name) else {
                continue;
            };
            let file_type = entry.file_type().map_err(|source| PatchError::ReadDir {
                path: dir_path.clone(),
                source,
            })?;
            if !file_type.is_file() {
                continue;
            }

            let rel_path = Path::new(patch_dir).join(file_name);
            if let Some(first) = seen.insert(id.clone(), rel_path.clone()) {
                return Err(PatchError::Duplicate {
                    id: id.to_string(),
                    first: first.display().to_string(),
                    second: rel_path.display().to_string(),
                });
            }

            let patch = load_patch(base_dir, &rel_path)?;
            if patch.active {
                found.insert(id, patch);
            }
        }
    }

    let mut ordered: Vec<Patch> = found.into_values().collect();
    if order == DiscoveryOrder::NewestFirst {
        ordered.reverse();
    }
    Ok(ordered)
}

/// Loads one patch file named relative to the project base dir. The patch
/// runner receives explicit file paths instead of scanning directories.
pub fn load_patch(base_dir: &Path, rel_path: &Path) -> Result<Patch, PatchError> {
    let named = rel_path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| {
            let stem = name.strip_suffix(".sql")?;
            let id = PatchId::from_file_name(name)?;
            Some((stem, id))
        });
    let Some((stem, id)) = named else {
        return Err(PatchError::Invalid {
            patch: rel_path.display().to_string(),
            reason: "file name does not follow the sql_YYYYMMDD_HHMMSS convention".to_string(),
        });
    };

    let file_path = base_dir.join(rel_path);
    let source = fs::read_to_string(&file_path).map_err(|source| PatchError::ReadFile {
        path: file_path,
        source,
    })?;
    parse_patch_file(id, stem, rel_path, &source)
}
