use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal pre-flight problems with the deployment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed reading config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed parsing config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Fatal pre-flight problems with a patch definition or the patch set.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("'{0}' is not a patch identity (expected YYYYMMDD_HHMMSS)")]
    InvalidIdentity(String),
    #[error("patch {patch}: {reason}")]
    Invalid { patch: String, reason: String },
    #[error("duplicate patch identity {id}: {first} and {second}")]
    Duplicate {
        id: String,
        first: String,
        second: String,
    },
    #[error("failed reading patch dir {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed reading patch {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
