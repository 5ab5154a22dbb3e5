//! Engine configuration
//!
//! Everything that fixes the on-disk shape of the index and record files is
//! chosen here, once, when a database is created or opened. Values can come
//! from a JSON file; missing fields take their defaults.
//!
//! ```json
//! { "order": 5, "key_width": 7, "payload_size": 64, "cache_capacity": 16 }
//! ```

use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::btree::{DEFAULT_KEY_WIDTH, DEFAULT_ORDER};
use crate::file::DEFAULT_CACHE_CAPACITY;
use crate::index::PageLayout;
use crate::record::RecordLayout;

/// Largest supported key identifier width
pub const MAX_KEY_WIDTH: usize = 64;

/// Default payload bytes per record
pub const DEFAULT_PAYLOAD_SIZE: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: &'static str, message: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Construction-time engine parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Max children per internal page
    pub order: usize,
    /// Key identifier width in bytes
    pub key_width: usize,
    /// Payload bytes per record
    pub payload_size: usize,
    /// Pages held by the page cache
    pub cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            order: DEFAULT_ORDER,
            key_width: DEFAULT_KEY_WIDTH,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Load and validate a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every parameter and the file sizes they imply
    pub fn validate(&self) -> ConfigResult<()> {
        if self.order < 3 {
            return Err(invalid("order", format!("{} is below 3", self.order)));
        }
        if self.key_width == 0 || self.key_width > MAX_KEY_WIDTH {
            return Err(invalid(
                "key_width",
                format!("{} is outside 1..={}", self.key_width, MAX_KEY_WIDTH),
            ));
        }
        if self.cache_capacity == 0 {
            return Err(invalid("cache_capacity", "must be at least 1".to_string()));
        }

        let page_size = self.page_layout().page_size();
        if page_size > u16::MAX as usize {
            return Err(invalid(
                "order",
                format!("page size {} does not fit in 16 bits", page_size),
            ));
        }
        let record_size = self.record_layout().record_size();
        if record_size > u16::MAX as usize {
            return Err(invalid(
                "payload_size",
                format!("record size {} does not fit in 16 bits", record_size),
            ));
        }

        Ok(())
    }

    pub fn page_layout(&self) -> PageLayout {
        PageLayout::new(self.order, self.key_width)
    }

    pub fn record_layout(&self) -> RecordLayout {
        RecordLayout::new(self.key_width, self.payload_size)
    }

    pub fn cache_capacity(&self) -> ConfigResult<NonZeroUsize> {
        NonZeroUsize::new(self.cache_capacity)
            .ok_or_else(|| invalid("cache_capacity", "must be at least 1".to_string()))
    }

    /// `btree-<order>.idx`
    pub fn index_file_name(&self) -> String {
        format!("btree-{}.idx", self.order)
    }
}

fn invalid(name: &'static str, message: String) -> ConfigError {
    ConfigError::InvalidValue { name, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.order, 5);
        assert_eq!(config.key_width, 7);
        assert_eq!(config.payload_size, 64);
        assert_eq!(config.cache_capacity, 16);
        assert!(config.validate().is_ok());
        assert_eq!(config.index_file_name(), "btree-5.idx");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("engine.json");
        fs::write(&path, r#"{ "order": 7 }"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.order, 7);
        assert_eq!(config.key_width, DEFAULT_KEY_WIDTH);
        assert_eq!(config.page_layout().page_size(), 7 + 6 * 9 + 14);
    }

    #[test]
    fn test_invalid_values() {
        let bad = [
            EngineConfig {
                order: 2,
                ..Default::default()
            },
            EngineConfig {
                key_width: 0,
                ..Default::default()
            },
            EngineConfig {
                key_width: 65,
                ..Default::default()
            },
            EngineConfig {
                cache_capacity: 0,
                ..Default::default()
            },
            EngineConfig {
                payload_size: 70_000,
                ..Default::default()
            },
            EngineConfig {
                order: 2_000,
                key_width: 64,
                ..Default::default()
            },
        ];

        for config in bad {
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidValue { .. })),
                "{:?} should be rejected",
                config
            );
        }
    }

    #[test]
    fn test_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("engine.json");
        fs::write(&path, "order = 5").unwrap();

        assert!(matches!(
            EngineConfig::from_file(&path),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            EngineConfig::from_file(temp_dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
