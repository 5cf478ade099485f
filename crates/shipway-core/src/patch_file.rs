use std::path::Path;

use crate::error::PatchError;
use crate::patch::{Patch, PatchId, PatchKind};

const DIRECTIVE_PREFIX: &str = "-- shipway:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Up,
    Down,
}

/// Parses one patch file. Directives are `-- shipway:<key> [value]` lines:
/// `active`, `kind` and `depends` in the header, then an `up` marker and an
/// optional `down` marker introducing the statement sections.
pub(crate) fn parse_patch_file(
    id: PatchId,
    name: &str,
    path: &Path,
    source: &str,
) -> Result<Patch, PatchError> {
    let mut section = Section::Header;
    let mut saw_up = false;
    let mut active = true;
    let mut kind = PatchKind::Small;
    let mut declared_dependencies: Vec<PatchId> = Vec::new();
    let mut up_lines: Vec<&str> = Vec::new();
    let mut down_lines: Vec<&str> = Vec::new();

    for line in source.lines() {
        let trimmed = line.trim();

        if let Some(directive) = trimmed.strip_prefix(DIRECTIVE_PREFIX) {
            let (key, value) = match directive.split_once(char::is_whitespace) {
                Some((key, value)) => (key.trim(), value.trim()),
                None => (directive.trim(), ""),
            };

            match key {
                "up" => {
                    if saw_up {
                        return Err(invalid(name, "duplicate up section"));
                    }
                    saw_up = true;
                    section = Section::Up;
                }
                "down" => {
                    if !saw_up {
                        return Err(invalid(name, "down section before up section"));
                    }
                    if section == Section::Down {
                        return Err(invalid(name, "duplicate down section"));
                    }
                    section = Section::Down;
                }
                "active" | "kind" | "depends" if section != Section::Header => {
                    return Err(invalid(
                        name,
                        &format!("'{key}' must appear before the up section"),
                    ));
                }
                "active" => {
                    active = parse_bool(name, value)?;
                }
                "kind" => {
                    kind = parse_kind(name, value)?;
                }
                "depends" => {
                    parse_dependencies(name, value, &mut declared_dependencies)?;
                }
                other => {
                    return Err(invalid(name, &format!("unknown directive '{other}'")));
                }
            }
            continue;
        }

        match section {
            Section::Header => {
                if !trimmed.is_empty() && !trimmed.starts_with("--") {
                    return Err(invalid(name, "statements before the up section"));
                }
            }
            Section::Up => up_lines.push(line),
            Section::Down => down_lines.push(line),
        }
    }

    if !saw_up {
        return Err(invalid(name, "missing up section"));
    }

    let up = join_statements(&up_lines);
    let down = join_statements(&down_lines);

    if !up.is_empty() && !up.ends_with(';') {
        return Err(invalid(name, "up section contains code but doesn't end with ';'"));
    }
    if !down.is_empty() && !down.ends_with(';') {
        return Err(invalid(
            name,
            "down section contains code but doesn't end with ';'",
        ));
    }

    Ok(Patch {
        id,
        name: name.to_string(),
        path: path.to_path_buf(),
        kind,
        active,
        up,
        down,
        declared_dependencies,
    })
}

fn join_statements(lines: &[&str]) -> String {
    lines.join("\n").trim().to_string()
}

fn parse_bool(name: &str, value: &str) -> Result<bool, PatchError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        "" => Err(invalid(name, "'active' needs a value")),
        other => Err(invalid(name, &format!("'active' must be true or false, got '{other}'"))),
    }
}

fn parse_kind(name: &str, value: &str) -> Result<PatchKind, PatchError> {
    match value {
        "small" => Ok(PatchKind::Small),
        "large" => Ok(PatchKind::Large),
        "" => Err(invalid(name, "'kind' needs a value")),
        other => Err(invalid(name, &format!("'kind' must be small or large, got '{other}'"))),
    }
}

fn parse_dependencies(
    name: &str,
    value: &str,
    into: &mut Vec<PatchId>,
) -> Result<(), PatchError> {
    for token in value.split([' ', '\t', ',']).filter(|token| !token.is_empty()) {
        let id: PatchId = token
            .parse()
            .map_err(|_| invalid(name, &format!("dependency '{token}' is not a patch identity")))?;
        into.push(id);
    }
    Ok(())
}

fn invalid(name: &str, reason: &str) -> PatchError {
    PatchError::Invalid {
        patch: name.to_string(),
        reason: reason.to_string(),
    }
}
