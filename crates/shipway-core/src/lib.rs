mod config;
mod error;
mod patch;
mod patch_file;
mod release;
mod repository;

pub use config::{DatabaseConfig, DeployConfig, HookConfig, DB_PASSWORD_ENV};
pub use error::{ConfigError, PatchError};
pub use patch::{Patch, PatchId, PatchKind, GENESIS_ID};
pub use release::ReleaseId;
pub use repository::{discover_patches, load_patch, DiscoveryOrder};
