use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::view::{SortOrder, ViewQuery};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("config validation failed: {message}")]
    Validation { message: String },
}

/// Initial state of the job table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewDefaults {
    pub open_only: bool,
    pub sort: SortOrder,
}

impl Default for ViewDefaults {
    fn default() -> Self {
        Self {
            open_only: true,
            sort: SortOrder::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub view: ViewDefaults,
    /// Reload the row store when the realtime feed reports dropped events.
    pub refresh_on_lag: bool,
    /// Filter directive used by `logging::init_logging` when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            view: ViewDefaults::default(),
            refresh_on_lag: true,
            log_filter: "info".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn default_query(&self) -> ViewQuery {
        ViewQuery {
            open_only: self.view.open_only,
            sort: self.view.sort,
            ..ViewQuery::default()
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SessionConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<SessionConfig, ConfigError> {
    let config: SessionConfig = serde_json::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &SessionConfig) -> Result<(), ConfigError> {
    if config.log_filter.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "log_filter must not be empty".to_string(),
        });
    }
    if let Err(e) = tracing_subscriber::EnvFilter::try_new(&config.log_filter) {
        return Err(ConfigError::Validation {
            message: format!("invalid log_filter '{}': {e}", config.log_filter),
        });
    }
    Ok(())
}
