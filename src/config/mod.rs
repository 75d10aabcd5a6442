//! Benchmark configuration
//!
//! This module provides the configuration types and loading utilities.
//!
//! # Example
//!
//! ```no_run
//! use dns_bench::config::load_config;
//!
//! let config = load_config("/etc/dns-bench/bench.json").unwrap();
//! println!("Benchmarking {} servers", config.servers.len());
//! ```

mod loader;
mod types;

pub use loader::{
    load_config, load_config_str, load_config_with_env, ENV_CONCURRENCY, ENV_QUERIES,
    ENV_TIMEOUT_SECS,
};
pub use types::{
    BenchConfig, DotEndpoint, Protocol, QueryType, SecurityConfig, Server, TrustTier,
    DEFAULT_DNS_PORT, DEFAULT_DOT_PORT, MAX_TIMEOUT_SECS,
};
