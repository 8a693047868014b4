use super::{LogFormat, RuntimeConfig};
use anyhow::{anyhow, Context, Result};

pub const ENV_PREFIX: &str = "UPSERT2PARQUET_";

/// Abstraction over environment-variable lookups so tests (and embedders) can
/// supply their own source of overrides.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;

    /// Get an environment variable WITHOUT the UPSERT2PARQUET_ prefix
    /// Used for conventional variables such as RUST_LOG
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the runtime config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Dataset defaults
    if let Some(granularity) = get_env_string(env, "GRANULARITY")? {
        config.dataset.granularity = Some(granularity);
    }
    if let Some(group_on) = get_env_string(env, "GROUP_ON")? {
        config.dataset.group_on = Some(group_on);
    }
    if let Some(columns) = get_env_list(env, "DROP_DUPLICATES_ON")? {
        config.dataset.drop_duplicates_on = Some(columns);
    }
    if let Some(val) = get_env_bool(env, "APPEND")? {
        config.dataset.append = val;
    }

    // Parquet encoding
    if let Some(row_group_size) = get_env_usize(env, "PARQUET_ROW_GROUP_SIZE")? {
        config.storage.parquet_row_group_size = row_group_size;
    }
    if let Some(compression) = get_env_string(env, "COMPRESSION")? {
        config.storage.compression = compression
            .parse()
            .context("Invalid UPSERT2PARQUET_COMPRESSION value")?;
    }

    // Logging: prefixed variable first, then the conventional RUST_LOG
    if let Some(level) = get_env_string(env, "LOG_LEVEL")? {
        config.logging.log_level = level;
    } else if let Some(level) = get_raw_env_string(env, "RUST_LOG")? {
        config.logging.log_level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT")? {
        config.logging.log_format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    Ok(())
}

fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Result<Option<String>> {
    Ok(env.get(key))
}

fn get_raw_env_string<E: EnvSource>(env: &E, key: &str) -> Result<Option<String>> {
    Ok(env.get_raw(key))
}

/// Comma-separated list; blank entries are dropped
fn get_env_list<E: EnvSource>(env: &E, key: &str) -> Result<Option<Vec<String>>> {
    Ok(get_env_string(env, key)?.map(|val| {
        val.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }))
}

fn get_env_usize<E: EnvSource>(env: &E, key: &str) -> Result<Option<usize>> {
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val
                .parse::<usize>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_bool<E: EnvSource>(env: &E, key: &str) -> Result<Option<bool>> {
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val.parse::<bool>().map_err(|e| {
                anyhow!(
                    "Failed to parse {}{} (expected bool): {}",
                    ENV_PREFIX,
                    key,
                    e
                )
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}
