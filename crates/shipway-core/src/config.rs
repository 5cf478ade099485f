use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Environment variable consulted for the database password when the config
/// file does not carry one. The password is never echoed or logged.
pub const DB_PASSWORD_ENV: &str = "SHIPWAY_DB_PASS";

#[derive(Debug, Clone, Deserialize)]
pub struct DeployConfig {
    pub project: String,
    pub hosts: Vec<String>,
    pub remote_user: String,
    pub remote_root: String,
    #[serde(default)]
    pub rsync_excludes: Vec<String>,
    #[serde(default)]
    pub data_dirs: Vec<String>,
    #[serde(default)]
    pub patch_dirs: Vec<String>,
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub hooks: HookConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub control_host: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: Option<String>,
    #[serde(default = "default_charset")]
    pub charset: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookConfig {
    #[serde(default)]
    pub post_activate: Vec<String>,
    #[serde(default)]
    pub post_rollback: Vec<String>,
}

fn default_port() -> u16 {
    3306
}

fn default_charset() -> String {
    "utf8mb4".to_string()
}

impl DeployConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic validation beyond what deserialization enforces. Collects
    /// every problem instead of stopping at the first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.project.is_empty() {
            problems.push("'project' must not be empty".to_string());
        }
        if self
            .project
            .chars()
            .any(|ch| ch == '/' || ch.is_whitespace())
        {
            problems.push("'project' must be a plain directory name fragment".to_string());
        }
        if self.hosts.is_empty() {
            problems.push("'hosts' must list at least one host".to_string());
        }
        for host in &self.hosts {
            if host.is_empty() {
                problems.push("'hosts' contains an empty entry".to_string());
            }
        }
        if self.remote_user.is_empty() {
            problems.push("'remote_user' must not be empty".to_string());
        }
        if !self.remote_root.starts_with('/') {
            problems.push("'remote_root' must be an absolute path".to_string());
        }
        for dir in &self.patch_dirs {
            if dir.is_empty() || dir.starts_with('/') {
                problems.push(format!("patch dir '{dir}' must be relative to the project root"));
            }
        }
        for dir in &self.data_dirs {
            if dir.is_empty() || dir.starts_with('/') || dir.split('/').any(|part| part == "..") {
                problems.push(format!("data dir '{dir}' must be a relative path inside the release"));
            }
        }

        if let Some(database) = &self.database {
            for (setting, value) in [
                ("database.control_host", &database.control_host),
                ("database.host", &database.host),
                ("database.name", &database.name),
                ("database.user", &database.user),
                ("database.charset", &database.charset),
            ] {
                if value.is_empty() {
                    problems.push(format!("'{setting}' must not be empty"));
                }
            }
            if database.port == 0 {
                problems.push("'database.port' must not be zero".to_string());
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

impl DatabaseConfig {
    /// Password from the config file, falling back to the environment.
    pub fn password(&self) -> Option<String> {
        self.password
            .clone()
            .or_else(|| env::var(DB_PASSWORD_ENV).ok())
    }
}
