//! Explicit configuration passed into catalogs, tables and the logger.
//!
//! # Responsibility
//! - Hold tunables that the data-mapping core reads at construction time.
//! - Load them from JSON and environment overrides.
//!
//! # Invariants
//! - Every field has a default, so `{}` is a valid configuration.
//! - `paging` is never below 1 once normalized.

use crate::query::DEFAULT_PAGING;
use serde::{Deserialize, Serialize};
use std::env;

const DEFAULT_MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_LOG_FILES: usize = 5;

/// Core data-mapping settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Rows per page for `limit_page` and `count_pages`.
    pub paging: u32,
    /// Create missing tables (and their indexes) when a model is registered.
    pub auto_create: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            paging: DEFAULT_PAGING,
            auto_create: true,
        }
    }
}

impl CoreConfig {
    /// Parses a JSON document; missing keys fall back to defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let mut config: Self = serde_json::from_str(text)?;
        config.normalize();
        Ok(config)
    }

    /// Applies `RELMAP_PAGING` and `RELMAP_AUTO_CREATE` when set and parseable.
    pub fn apply_env_vars(&mut self) {
        if let Some(paging) = env::var("RELMAP_PAGING")
            .ok()
            .and_then(|value| value.trim().parse::<u32>().ok())
        {
            self.paging = paging;
        }
        if let Ok(flag) = env::var("RELMAP_AUTO_CREATE") {
            match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.auto_create = true,
                "0" | "false" | "no" | "off" => self.auto_create = false,
                _ => {}
            }
        }
        self.normalize();
    }

    pub fn normalize(&mut self) {
        self.paging = self.paging.max(1);
    }
}

/// File logger settings consumed by [`crate::logging::init_logging`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of `trace|debug|info|warn|error`.
    pub level: String,
    /// Absolute directory for rolling log files.
    pub log_dir: String,
    pub max_file_size_bytes: u64,
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            log_dir: String::new(),
            max_file_size_bytes: DEFAULT_MAX_LOG_FILE_SIZE_BYTES,
            max_files: DEFAULT_MAX_LOG_FILES,
        }
    }
}

impl LoggingConfig {
    pub fn new(level: impl Into<String>, log_dir: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            log_dir: log_dir.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CoreConfig;
    use crate::query::DEFAULT_PAGING;

    #[test]
    fn empty_json_uses_defaults() {
        let config = CoreConfig::from_json("{}").expect("empty object should parse");
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.paging, 10);
        assert!(config.auto_create);
    }

    #[test]
    fn zero_paging_is_forced_to_one() {
        let config = CoreConfig::from_json(r#"{"paging": 0}"#).expect("valid json");
        assert_eq!(config.paging, 1);
    }

    #[test]
    fn default_paging_is_the_query_default() {
        assert_eq!(CoreConfig::default().paging, DEFAULT_PAGING);
    }
}
