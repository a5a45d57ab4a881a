//! Engine configuration
//!
//! Loaded from a JSON file. Every field has a default, so `{}` is a valid
//! configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::Severity;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),

    /// File is not valid config JSON
    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds an unusable value
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// When empty index nodes are compacted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanSweep {
    /// Lazy repair only; `sweep` must be called explicitly
    #[default]
    Disabled,
    /// Sweep the domain after every delete that removed documents
    AfterDelete,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Project id used when a context carries none (default: "default")
    #[serde(default = "default_project_id")]
    pub project_id: String,

    /// Deadline per store call in milliseconds (default: 5000)
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Domains reachable only with the master key
    #[serde(default = "default_reserved_domains")]
    pub reserved_domains: Vec<String>,

    /// Orphan node compaction (default: disabled)
    #[serde(default)]
    pub orphan_sweep: OrphanSweep,

    /// Minimum log severity (default: "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_project_id() -> String {
    "default".to_string()
}

fn default_store_timeout_ms() -> u64 {
    5000
}

fn default_reserved_domains() -> Vec<String> {
    vec!["_User".to_string(), "_Token".to_string(), "_Policy".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            project_id: default_project_id(),
            store_timeout_ms: default_store_timeout_ms(),
            reserved_domains: default_reserved_domains(),
            orphan_sweep: OrphanSweep::default(),
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check field values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project_id.is_empty() {
            return Err(ConfigError::Invalid("project_id must not be empty".into()));
        }
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::Invalid("store_timeout_ms must be > 0".into()));
        }
        if Severity::parse(&self.log_level).is_none() {
            return Err(ConfigError::Invalid(format!(
                "Unknown log_level: '{}'",
                self.log_level
            )));
        }
        Ok(())
    }

    /// Parsed minimum log severity
    pub fn severity(&self) -> Severity {
        Severity::parse(&self.log_level).unwrap_or(Severity::Info)
    }

    /// Whether a domain is reserved
    pub fn is_reserved(&self, domain: &str) -> bool {
        self.reserved_domains.iter().any(|d| d == domain)
    }
}
