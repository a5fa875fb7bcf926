//! Configuration loading for the ingestion tools
//!
//! A single TOML file holds everything a pass needs: where the backend lives,
//! credentials, concurrency, and the repository key table.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line `--config` path
//! 2. `ASPACE_INGEST_CONFIG` environment variable
//! 3. `./config.toml`
//!
//! After loading, `ASPACE_BACKEND_URI`, `ASPACE_USERNAME` and
//! `ASPACE_PASSWORD` override the corresponding file values.

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "ASPACE_INGEST_CONFIG";
pub const BACKEND_URI_ENV: &str = "ASPACE_BACKEND_URI";
pub const USERNAME_ENV: &str = "ASPACE_USERNAME";
pub const PASSWORD_ENV: &str = "ASPACE_PASSWORD";

const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Ingestion configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Base URI of the backend API, e.g. `http://localhost:8089`
    #[serde(default)]
    pub backend_uri: String,

    /// Login user
    #[serde(default = "default_username")]
    pub username: String,

    /// Login password (may come from `ASPACE_PASSWORD` instead)
    #[serde(default)]
    pub password: Option<String>,

    /// Maximum concurrent in-flight requests during a run
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Files converted per run in the EAD pass
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Page size for find-or-create searches
    #[serde(default = "default_search_page_size")]
    pub search_page_size: u32,

    /// Per-request transport timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Repository key (filename prefix or CLI name) to repository id
    #[serde(default)]
    pub repositories: BTreeMap<String, i64>,

    /// Directory scanned by the EAD pass
    #[serde(default)]
    pub ingest_dir: Option<PathBuf>,

    /// Where the external-id to persisted-id table is written
    #[serde(default = "default_id_mapping_file")]
    pub id_mapping_file: PathBuf,

    /// Raw failing response bodies are appended here
    #[serde(default)]
    pub diagnostics_file: Option<PathBuf>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_max_concurrency() -> usize {
    4
}

fn default_batch_size() -> usize {
    20
}

fn default_search_page_size() -> u32 {
    250
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_id_mapping_file() -> PathBuf {
    PathBuf::from("eadids_2_ids.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Load, apply environment overrides and validate
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Read config {} failed: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;

        info!(
            path = %path.display(),
            backend = %config.backend_uri,
            repositories = config.repositories.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parse without environment overrides or validation
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Environment variables win over file values
    pub fn apply_env_overrides(&mut self) {
        if let Ok(uri) = std::env::var(BACKEND_URI_ENV) {
            if !uri.trim().is_empty() {
                self.backend_uri = uri;
            }
        }
        if let Ok(user) = std::env::var(USERNAME_ENV) {
            if !user.trim().is_empty() {
                self.username = user;
            }
        }
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            if self.password.is_some() {
                warn!("Password found in both config file and {}; using environment", PASSWORD_ENV);
            }
            self.password = Some(password);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend_uri.trim().is_empty() {
            return Err(Error::Config(format!(
                "backend_uri not configured (set it in the config file or {})",
                BACKEND_URI_ENV
            )));
        }
        if self.max_concurrency == 0 {
            return Err(Error::Config("max_concurrency must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if self.search_page_size == 0 {
            return Err(Error::Config("search_page_size must be at least 1".to_string()));
        }
        self.password()?;
        Ok(())
    }

    pub fn password(&self) -> Result<&str> {
        self.password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                Error::Config(format!(
                    "password not configured (set it in the config file or {})",
                    PASSWORD_ENV
                ))
            })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Look up a repository id by its configured key
    pub fn repository_id(&self, key: &str) -> Result<i64> {
        self.repositories
            .get(key)
            .copied()
            .ok_or_else(|| Error::Config(format!("Unknown repository key '{}'", key)))
    }

    /// Repository for a document, keyed by the non-digit prefix of its file name
    ///
    /// `mnsss042.xml` resolves through the `mnsss` key.
    pub fn repository_for_file(&self, path: &Path) -> Option<i64> {
        let name = path.file_name()?.to_str()?;
        let prefix: String = name.chars().take_while(|c| !c.is_ascii_digit()).collect();
        if prefix.is_empty() {
            return None;
        }
        self.repositories.get(&prefix).copied()
    }
}

/// Resolve the configuration file path
pub fn resolve_config_path(cli_arg: Option<&Path>) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: working directory default
    PathBuf::from(DEFAULT_CONFIG_FILE)
}
