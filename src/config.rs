use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants;
use crate::error::{MigrateError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub schema: SchemaConfig,
    pub link: LinkConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub database: PathBuf,
    pub source: PathBuf,
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Delete an existing database file before creating the tables
    pub recreate: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// TOML rule file; the built-in catalog is used when absent
    pub rules_file: Option<PathBuf>,
    /// Where to write the JSON run report, if anywhere
    pub report_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus text snapshot written when the process finishes
    pub snapshot_file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(constants::DEFAULT_DATABASE_PATH),
            source: PathBuf::from(constants::DEFAULT_SOURCE_PATH),
            log_dir: PathBuf::from(constants::DEFAULT_LOG_DIR),
        }
    }
}

impl Config {
    /// Load configuration with environment overrides applied.
    ///
    /// An explicitly requested file must exist; the default `config.toml` is
    /// optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(constants::DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MigrateError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_path(constants::ENV_DATABASE_PATH) {
            self.paths.database = v;
        }
        if let Some(v) = env_path(constants::ENV_SOURCE_PATH) {
            self.paths.source = v;
        }
        if let Some(v) = env_path(constants::ENV_LOG_DIR) {
            self.paths.log_dir = v;
        }
        if let Some(v) = env_path(constants::ENV_RULES_FILE) {
            self.link.rules_file = Some(v);
        }
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}
