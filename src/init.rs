// Initialization utilities for the command-line tool
//
// Logging/tracing setup and translation of runtime config into writer settings

use anyhow::{bail, Context, Result};
use std::path::Path;
use upsert2parquet_config::{LogConfig, LogFormat, RuntimeConfig};
use upsert2parquet_core::{DuplicatePolicy, Granularity};
use upsert2parquet_writer::WriteMode;

/// Initialize tracing/logging from the logging section of the config
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub(crate) fn init_tracing(config: &LogConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Parse log level from config
    let env_filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Try to set the global subscriber; ignore error if already set (idempotent)
    let _ = match config.log_format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_writer(std::io::stderr)),
        ),
        LogFormat::Text => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_writer(std::io::stderr)),
        ),
    };
}

/// Load config from an explicit file, or from the default sources
pub(crate) fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => RuntimeConfig::load().context("Failed to load configuration"),
    }
}

/// Granularity from the command line, falling back to `dataset.granularity`
pub(crate) fn resolve_granularity(
    flag: Option<&str>,
    config: &RuntimeConfig,
) -> Result<Granularity> {
    let Some(raw) = flag.or(config.dataset.granularity.as_deref()) else {
        bail!("No granularity given: pass --granularity or set dataset.granularity in the config file");
    };
    raw.parse::<Granularity>()
        .with_context(|| format!("Invalid granularity '{}'", raw))
}

/// Duplicate columns from the command line, falling back to `dataset.drop_duplicates_on`
pub(crate) fn resolve_policy(flags: &[String], config: &RuntimeConfig) -> DuplicatePolicy {
    if flags.is_empty() {
        DuplicatePolicy::from_columns(config.dataset.drop_duplicates_on.clone())
    } else {
        DuplicatePolicy::Columns(flags.to_vec())
    }
}

pub(crate) fn resolve_mode(create: bool, config: &RuntimeConfig) -> WriteMode {
    if create || !config.dataset.append {
        WriteMode::Create
    } else {
        WriteMode::Append
    }
}
