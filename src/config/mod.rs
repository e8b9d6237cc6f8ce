//! Configuration for a snapshot run
//!
//! Values come from (highest first) command-line flags, an optional TOML
//! config file, then the defaults below.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SnapshotError};
use crate::utils::{env_path, RetryConfig, CORE_MODULES_ENV};

/// Public MetaCPAN API
pub const DEFAULT_INDEX_URL: &str = "https://fastapi.metacpan.org/";

/// Cache subdirectory under the user cache root
pub const CACHE_SUBDIR: &str = "rules-cpan-snapshot";

/// Snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Base URL of the package index (MetaCPAN API)
    pub index_url: String,

    /// Directory holding downloaded archives and their sidecars
    pub cache_dir: PathBuf,

    /// Maximum number of packages resolved in parallel
    pub jobs: usize,

    /// Perl version used for core-module lookups (None = newest in table)
    pub perl_version: Option<String>,

    /// Input cpanfile
    pub cpanfile: PathBuf,

    /// Core-module table JSON (falls back to $CORE_MODULES)
    pub core_modules: Option<PathBuf>,

    /// Output lockfile (None = stdout)
    pub output: Option<PathBuf>,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Index lookup retries
    pub retry: RetryConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "cpan_snapshot=debug"
    pub filter: Option<String>,

    /// Emit JSON log lines (requires the `json-logging` feature)
    pub json_format: bool,
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(CACHE_SUBDIR)
}

fn default_jobs() -> usize {
    num_cpus::get().max(1)
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.to_string(),
            cache_dir: default_cache_dir(),
            jobs: default_jobs(),
            perl_version: None,
            cpanfile: PathBuf::from("cpanfile"),
            core_modules: None,
            output: None,
            logging: LoggingConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl SnapshotConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SnapshotError::Configuration(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: SnapshotConfig = toml::from_str(contents).map_err(|e| {
            SnapshotError::Configuration(format!("Failed to parse config TOML: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            return Err(SnapshotError::Configuration(
                "jobs must be at least 1".to_string(),
            ));
        }
        if self.index_url.trim().is_empty() {
            return Err(SnapshotError::Configuration(
                "index_url cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Core-module table path, from config or $CORE_MODULES
    pub fn core_modules_path(&self) -> Result<PathBuf> {
        self.core_modules
            .clone()
            .or_else(|| env_path(CORE_MODULES_ENV))
            .ok_or_else(|| {
                SnapshotError::Configuration(format!(
                    "No core module table given (use --core-modules or ${})",
                    CORE_MODULES_ENV
                ))
            })
    }
}
