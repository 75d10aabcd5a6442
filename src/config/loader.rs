//! Configuration loading
//!
//! This module handles loading a benchmark configuration from files and
//! environment variables.

use std::path::Path;

use tracing::{debug, info};

use super::types::BenchConfig;
use crate::error::ConfigError;

/// Environment variable overriding `timeout_secs`
pub const ENV_TIMEOUT_SECS: &str = "DNS_BENCH_TIMEOUT_SECS";

/// Environment variable overriding `concurrency_limit`
pub const ENV_CONCURRENCY: &str = "DNS_BENCH_CONCURRENCY";

/// Environment variable overriding `queries_per_test`
pub const ENV_QUERIES: &str = "DNS_BENCH_QUERIES";

/// Load configuration from a JSON file
///
/// # Arguments
///
/// * `path` - Path to the configuration file
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed or validated.
pub fn load_config(path: impl AsRef<Path>) -> Result<BenchConfig, ConfigError> {
    let path = path.as_ref();

    debug!("Loading benchmark configuration from {:?}", path);

    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let contents = std::fs::read_to_string(path)?;

    let config: BenchConfig = serde_json::from_str(&contents).map_err(|e| {
        ConfigError::ParseError(format!("Failed to parse JSON: {e} at {path:?}"))
    })?;

    config.validate()?;

    info!(
        servers = config.servers.len(),
        protocols = ?config.protocols,
        domains = config.domains.len(),
        "Benchmark configuration loaded"
    );

    Ok(config)
}

/// Load configuration from a JSON string
///
/// # Errors
///
/// Returns `ConfigError` if parsing or validation fails.
pub fn load_config_str(json: &str) -> Result<BenchConfig, ConfigError> {
    let config: BenchConfig =
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.validate()?;

    Ok(config)
}

/// Load configuration with environment variable overrides
///
/// Environment variables:
/// - `DNS_BENCH_TIMEOUT_SECS`: Override the per-query timeout
/// - `DNS_BENCH_CONCURRENCY`: Override the concurrency limit
/// - `DNS_BENCH_QUERIES`: Override repetitions per test
///
/// # Errors
///
/// Returns `ConfigError` if loading, parsing or validation fails, or if an
/// override cannot be parsed.
pub fn load_config_with_env(path: impl AsRef<Path>) -> Result<BenchConfig, ConfigError> {
    let mut config = load_config(path)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

/// Apply overrides from a variable lookup
///
/// Split out from [`load_config_with_env`] so tests need not touch the
/// process environment.
pub(crate) fn apply_env_overrides(
    config: &mut BenchConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(timeout) = lookup(ENV_TIMEOUT_SECS) {
        config.timeout_secs = timeout.parse().map_err(|_| ConfigError::EnvError {
            name: ENV_TIMEOUT_SECS.into(),
            reason: format!("Invalid number of seconds: {timeout}"),
        })?;
        debug!("Timeout overridden to {}s", config.timeout_secs);
    }

    if let Some(limit) = lookup(ENV_CONCURRENCY) {
        config.concurrency_limit = limit.parse().map_err(|_| ConfigError::EnvError {
            name: ENV_CONCURRENCY.into(),
            reason: format!("Invalid number: {limit}"),
        })?;
        debug!("Concurrency limit overridden to {}", config.concurrency_limit);
    }

    if let Some(queries) = lookup(ENV_QUERIES) {
        config.queries_per_test = queries.parse().map_err(|_| ConfigError::EnvError {
            name: ENV_QUERIES.into(),
            reason: format!("Invalid number: {queries}"),
        })?;
        debug!("Queries per test overridden to {}", config.queries_per_test);
    }

    Ok(())
}
