// Configuration validation
//
// Validates that values are sensible. Granularity strings are parsed (and
// rejected) by upsert2parquet-core when a merge runs.

use crate::*;
use anyhow::{bail, Result};
use tracing::warn;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_dataset_config(&config.dataset)?;
    validate_storage_config(&config.storage)?;
    validate_log_config(&config.logging)?;
    Ok(())
}

fn validate_dataset_config(config: &DatasetConfig) -> Result<()> {
    if let Some(granularity) = &config.granularity {
        if granularity.trim().is_empty() {
            bail!("dataset.granularity must not be empty when set");
        }
    }

    if let Some(group_on) = &config.group_on {
        if group_on.is_empty() {
            bail!("dataset.group_on must not be empty when set");
        }
    }

    if let Some(columns) = &config.drop_duplicates_on {
        if columns.iter().any(|c| c.trim().is_empty()) {
            bail!("dataset.drop_duplicates_on must not contain empty column names");
        }
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<()> {
    if config.parquet_row_group_size == 0 {
        bail!("storage.parquet_row_group_size must be greater than 0");
    }

    // Whole partitions are held in memory during a merge
    if config.parquet_row_group_size > 10_000_000 {
        warn!(
            parquet_row_group_size = config.parquet_row_group_size,
            "storage.parquet_row_group_size is very large; may cause memory issues"
        );
    }

    Ok(())
}

fn validate_log_config(config: &LogConfig) -> Result<()> {
    if config.log_level.trim().is_empty() {
        bail!("logging.log_level must not be empty");
    }

    Ok(())
}
