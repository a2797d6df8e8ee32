use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::cache::phone::DEFAULT_MIN_MATCH_DIGITS;
use crate::sort::Sort;

/// Name of the optional config file inside the data directory.
pub const CONFIG_FILE_NAME: &str = "threadline.toml";

/// Name of the store database inside the data directory.
pub const STORE_FILE_NAME: &str = "threadline.sqlite3";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Rows returned by one `next_page` call unless the view overrides it.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default)]
    pub grouping: GroupingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            grouping: GroupingConfig::default(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Sort that picks each conversation's displayed thread.
    #[serde(default)]
    pub sort: Sort,
    #[serde(default = "default_min_phone_match_digits")]
    pub min_phone_match_digits: usize,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            sort: Sort::default(),
            min_phone_match_digits: default_min_phone_match_digits(),
        }
    }
}

/// Load `<data_dir>/threadline.toml`, or defaults when it does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_engine_config(data_dir: &Path) -> Result<EngineConfig> {
    let path = data_dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(EngineConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<EngineConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

const fn default_true() -> bool {
    true
}

const fn default_page_size() -> usize {
    50
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

const fn default_min_phone_match_digits() -> usize {
    DEFAULT_MIN_MATCH_DIGITS
}
