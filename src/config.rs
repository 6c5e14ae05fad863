//! Cascade configuration
//!
//! YAML configuration carrying the role table and the canonical token table.
//! The default configuration is embedded in the crate; set
//! `OFFER_CASCADE_CONFIG` to load a different file.

use serde::{Deserialize, Serialize};

use crate::entry::{RoleEntryPointStrategy, RoleTable};
use crate::error::ConfigError;
use crate::schema::canonical::{CanonicalEntries, CanonicalTable};

/// Environment variable naming an alternative configuration file
pub const CONFIG_PATH_ENV: &str = "OFFER_CASCADE_CONFIG";

/// Embedded default configuration
const DEFAULT_CONFIG: &str = include_str!("../config/cascade.yaml");

fn default_log_filter() -> String {
    "offer_cascade=info".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeConfig {
    /// Default tracing directive, used when `RUST_LOG` is unset
    pub log_filter: String,
    pub roles: RoleTable,
    pub canonical: CanonicalTable,
}

/// On-disk shape, validated into [`CascadeConfig`]
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default = "default_log_filter")]
    log_filter: String,
    roles: RoleTable,
    #[serde(default)]
    canonical: CanonicalEntries,
}

impl CascadeConfig {
    /// Load from `OFFER_CASCADE_CONFIG`, or the embedded default
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => {
                tracing::info!(path = %path, "Loading cascade configuration");
                Self::from_file(&path)
            }
            Err(_) => Self::embedded(),
        }
    }

    /// The configuration shipped with the crate
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_yaml(DEFAULT_CONFIG)
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_yaml::from_str(content)?;
        file.roles.validate()?;
        let config = CascadeConfig {
            log_filter: file.log_filter,
            roles: file.roles,
            canonical: CanonicalTable::from_entries(file.canonical)?,
        };
        tracing::debug!(
            roles = config.roles.len(),
            log_filter = %config.log_filter,
            "Cascade configuration loaded"
        );
        Ok(config)
    }

    pub fn strategy(&self) -> RoleEntryPointStrategy {
        RoleEntryPointStrategy::new(self.roles.clone())
    }
}
