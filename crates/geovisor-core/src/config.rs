//! Analysis configuration shared by the library crates and the CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::record::FieldMap;

pub const DEFAULT_PAGE_SIZE: usize = 2000;
pub const DEFAULT_BATCH_SIZE: usize = 25;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Tunables for fetching, aggregation, and overlay analysis.
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Records per page when paging through a feature source.
    pub page_size: usize,
    /// Candidates tested concurrently per overlay batch.
    pub batch_size: usize,
    /// Per-page request timeout.
    pub page_timeout_secs: u64,
    /// Retries per page after the first failure.
    pub page_retries: u32,
    /// Stable sort key requested while paging (e.g. `OBJECTID`).
    pub order_by: Option<String>,
    /// Category terms for participant statistics.
    pub categories: Vec<String>,
    /// Category pairs whose shared participants are counted.
    pub pairs: Vec<(String, String)>,
    pub fields: FieldMap,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            page_timeout_secs: 30,
            page_retries: 1,
            order_by: None,
            categories: vec!["cafe".into(), "cacao".into()],
            pairs: vec![("cafe".into(), "cacao".into())],
            fields: FieldMap::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load from a JSON file, filling unspecified keys with defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        info!(path = %path.display(), "loaded analysis config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Zero("page_size"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Zero("batch_size"));
        }
        Ok(())
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }
}
