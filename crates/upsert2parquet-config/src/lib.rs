// upsert2parquet-config - Runtime configuration
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority)
// 2. Config file path from UPSERT2PARQUET_CONFIG env var
// 3. Config file contents from UPSERT2PARQUET_CONFIG_CONTENT env var
// 4. Default config file locations (./config.toml, ./.upsert2parquet.toml)
// 5. Built-in defaults (lowest priority)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, ENV_PREFIX};

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub dataset: DatasetConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LogConfig,
}

/// Defaults for merge calls; command-line flags take precedence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Partition width, e.g. "2H", "D", "M"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granularity: Option<String>,

    /// Column holding the temporal key; first column when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_on: Option<String>,

    /// Columns identifying duplicates; every column when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_duplicates_on: Option<Vec<String>>,

    #[serde(default = "default_append")]
    pub append: bool,
}

fn default_append() -> bool {
    true
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            granularity: None,
            group_on: None,
            drop_duplicates_on: None,
            append: true,
        }
    }
}

/// Parquet encoding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_parquet_row_group_size")]
    pub parquet_row_group_size: usize,

    #[serde(default)]
    pub compression: CompressionCodec,
}

fn default_parquet_row_group_size() -> usize {
    32 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            parquet_row_group_size: default_parquet_row_group_size(),
            compression: CompressionCodec::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionCodec {
    Snappy,
    #[default]
    Zstd,
    Uncompressed,
}

impl std::fmt::Display for CompressionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompressionCodec::Snappy => write!(f, "snappy"),
            CompressionCodec::Zstd => write!(f, "zstd"),
            CompressionCodec::Uncompressed => write!(f, "uncompressed"),
        }
    }
}

impl std::str::FromStr for CompressionCodec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "snappy" => Ok(CompressionCodec::Snappy),
            "zstd" => Ok(CompressionCodec::Zstd),
            "uncompressed" | "none" => Ok(CompressionCodec::Uncompressed),
            _ => anyhow::bail!(
                "Unsupported compression: {}. Supported: snappy, zstd, uncompressed",
                s
            ),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Load configuration starting from an explicit file (for a `--config` flag)
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Parse TOML content and apply overrides from `env`
    pub fn from_toml_with_env<E: EnvSource>(content: &str, env: &E) -> Result<Self> {
        let mut config = RuntimeConfig::default();
        let file_config: RuntimeConfig =
            toml::from_str(content).context("Failed to parse inline config content")?;
        config.merge(file_config);
        config.apply_env_overrides_from(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace sections with those of `other`
    pub fn merge(&mut self, other: RuntimeConfig) {
        self.dataset = other.dataset;
        self.storage = other.storage;
        self.logging = other.logging;
    }

    /// Apply environment overrides from a custom source
    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    pub(crate) struct MapEnv(pub HashMap<String, String>);

    impl EnvSource for MapEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.0.get(&format!("{}{}", ENV_PREFIX, key)).cloned()
        }

        fn get_raw(&self, key: &str) -> Option<String> {
            self.0.get(key).cloned()
        }
    }

    #[test]
    fn test_compression_from_str() {
        assert_eq!(
            "snappy".parse::<CompressionCodec>().unwrap(),
            CompressionCodec::Snappy
        );
        assert_eq!(
            "ZSTD".parse::<CompressionCodec>().unwrap(),
            CompressionCodec::Zstd
        );
        assert_eq!(
            "none".parse::<CompressionCodec>().unwrap(),
            CompressionCodec::Uncompressed
        );
        assert!("lz4".parse::<CompressionCodec>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert!(config.dataset.append);
        assert!(config.dataset.granularity.is_none());
        assert_eq!(config.storage.parquet_row_group_size, 32 * 1024);
        assert_eq!(config.storage.compression, CompressionCodec::Zstd);
        assert_eq!(config.logging.log_level, "info");
        assert_eq!(config.logging.log_format, LogFormat::Text);
    }

    #[test]
    fn test_toml_sections_with_partial_fields() {
        let content = r#"
            [dataset]
            granularity = "2H"
            drop_duplicates_on = ["humidity", "location"]

            [storage]
            compression = "snappy"
        "#;
        let config = RuntimeConfig::from_toml_with_env(content, &MapEnv(HashMap::new())).unwrap();
        assert_eq!(config.dataset.granularity.as_deref(), Some("2H"));
        assert!(config.dataset.append);
        assert_eq!(
            config.dataset.drop_duplicates_on,
            Some(vec!["humidity".to_string(), "location".to_string()])
        );
        assert_eq!(config.storage.compression, CompressionCodec::Snappy);
        assert_eq!(config.storage.parquet_row_group_size, 32 * 1024);
    }

    #[test]
    fn test_env_overrides_win_over_file() {
        let content = r#"
            [dataset]
            granularity = "2H"
            group_on = "timestamp"

            [logging]
            log_level = "warn"
            log_format = "text"
        "#;
        let env = MapEnv(HashMap::from([
            ("UPSERT2PARQUET_GRANULARITY".to_string(), "D".to_string()),
            ("UPSERT2PARQUET_APPEND".to_string(), "false".to_string()),
            (
                "UPSERT2PARQUET_DROP_DUPLICATES_ON".to_string(),
                "humidity, location".to_string(),
            ),
            ("UPSERT2PARQUET_LOG_FORMAT".to_string(), "json".to_string()),
        ]));

        let config = RuntimeConfig::from_toml_with_env(content, &env).unwrap();
        assert_eq!(config.dataset.granularity.as_deref(), Some("D"));
        assert_eq!(config.dataset.group_on.as_deref(), Some("timestamp"));
        assert!(!config.dataset.append);
        assert_eq!(
            config.dataset.drop_duplicates_on,
            Some(vec!["humidity".to_string(), "location".to_string()])
        );
        assert_eq!(config.logging.log_level, "warn");
        assert_eq!(config.logging.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_env_value_is_reported() {
        let env = MapEnv(HashMap::from([(
            "UPSERT2PARQUET_PARQUET_ROW_GROUP_SIZE".to_string(),
            "lots".to_string(),
        )]));
        let err = RuntimeConfig::from_toml_with_env("", &env).unwrap_err();
        assert!(err.to_string().contains("PARQUET_ROW_GROUP_SIZE"));
    }
}
