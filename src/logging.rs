//! Logging bootstrap
//!
//! The library only emits `tracing` events; binaries and tests call
//! [`init`] once to install a `tracing-subscriber` fmt subscriber.
//! Directives from `DNS_BENCH_LOG` take precedence over the configured level.

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;

/// Environment variable holding filter directives
pub const LOG_ENV: &str = "DNS_BENCH_LOG";

/// Crates whose chatter is capped at `warn`
const QUIET_TARGETS: [&str; 4] = ["hyper=warn", "h2=warn", "rustls=warn", "tokio=warn"];

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default level: trace, debug, info, warn or error
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,

    /// Include event targets
    #[serde(default)]
    pub target: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::Text,
            target: false,
        }
    }
}

impl LogConfig {
    /// Settings with a given default level
    pub fn with_level(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Self::default()
        }
    }
}

/// Build the event filter for `config`
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` for an unknown level.
pub fn build_filter(config: &LogConfig) -> Result<EnvFilter, ConfigError> {
    let level: Level = config
        .level
        .parse()
        .map_err(|_| ConfigError::invalid(format!("unknown log level '{}'", config.level)))?;

    let mut filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .with_env_var(LOG_ENV)
        .from_env_lossy();

    for target in QUIET_TARGETS {
        let directive: Directive = target
            .parse()
            .map_err(|e| ConfigError::invalid(format!("bad log directive '{target}': {e}")))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

/// Install the global subscriber
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` for an unknown level or when a
/// global subscriber is already installed.
pub fn init(config: &LogConfig) -> Result<(), ConfigError> {
    let filter = build_filter(config)?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.target);

    let result = match config.format {
        LogFormat::Json => subscriber.json().try_init(),
        LogFormat::Text => subscriber.try_init(),
    };
    result.map_err(|e| ConfigError::invalid(format!("logging already initialised: {e}")))
}
