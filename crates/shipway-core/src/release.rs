use std::fmt;

use chrono::NaiveDateTime;

const DIR_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H%M%S";

/// One release of a project on a host: a directory named
/// `{project}_{YYYY-MM-DD_HHMMSS}`. Ordering follows the embedded timestamp,
/// newest last.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReleaseId {
    timestamp: NaiveDateTime,
    project: String,
}

impl ReleaseId {
    pub fn new(project: &str, timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            project: project.to_string(),
        }
    }

    /// Parses a directory name back into a release, if it follows this
    /// project's naming convention. Foreign entries yield `None`.
    pub fn parse(project: &str, dir_name: &str) -> Option<Self> {
        let rest = dir_name.strip_prefix(project)?.strip_prefix('_')?;
        let timestamp = NaiveDateTime::parse_from_str(rest, DIR_TIMESTAMP_FORMAT).ok()?;
        Some(Self::new(project, timestamp))
    }

    pub fn dir_name(&self) -> String {
        format!("{}_{}", self.project, self.stamp())
    }

    /// The timestamp fragment of the directory name.
    pub fn stamp(&self) -> String {
        self.timestamp.format(DIR_TIMESTAMP_FORMAT).to_string()
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dir_name())
    }
}
