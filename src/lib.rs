//! dns-bench: concurrent multi-protocol DNS resolver benchmark
//!
//! This crate measures and compares DNS resolvers by issuing controlled
//! batches of queries over several transports, aggregating latency and loss
//! statistics, and cross-checking answers for signs of tampering.
//!
//! # Features
//!
//! - **Multiple transports**: UDP, TCP, DNS-over-TLS and DNS-over-HTTPS
//! - **Bounded concurrency**: FIFO admission gate with a hard in-flight cap
//! - **Statistics under partial failure**: latency over successes, loss and
//!   reliability over all attempts
//! - **Security analysis**: DNSSEC chain validation, quorum-based hijack
//!   detection, TTL decay checks
//! - **Cancellation**: stop admitting work and report what was observed
//!
//! # Architecture
//!
//! ```text
//! BenchConfig → JobPlan → Scheduler → Transport (UDP/TCP/DoT/DoH) → Outcome
//!      │                                                              ↓
//!      └──────→ SecurityAnalyzer ──→ SecurityFinding              Aggregator
//!                                          ↓                          ↓
//!                                          └─────────→ Report ←───────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use dns_bench::config::load_config;
//! use dns_bench::engine::Benchmark;
//! use dns_bench::config::Protocol;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("bench.json")?;
//! let report = Benchmark::new(config)?.run(CancellationToken::new()).await?;
//!
//! for row in report.rows() {
//!     println!("{} {} {:?} {:?}", row.server, row.protocol, row.mean_ms, row.loss_pct);
//! }
//! for entry in report.rankings(Protocol::Udp) {
//!     println!("#{} {}", entry.rank, entry.server);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`aggregate`]: Per-(server, protocol) statistics and ranking
//! - [`config`]: Configuration types and loading
//! - [`engine`]: Benchmark entry point
//! - [`error`]: Failure taxonomy and error types
//! - [`logging`]: Subscriber setup
//! - [`report`]: Run report and export rows
//! - [`scheduler`]: Job expansion and bounded-concurrency execution
//! - [`security`]: DNSSEC, hijack and cache analysis
//! - [`transport`]: Wire protocol adapters

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod report;
pub mod scheduler;
pub mod security;
pub mod transport;

// Re-export commonly used types at the crate root
pub use aggregate::{Aggregator, ProtocolStats, StatsTable};
pub use config::{load_config, BenchConfig, Protocol, QueryType, SecurityConfig, Server};
pub use engine::{run_benchmark, Benchmark};
pub use error::{ConfigError, FailureKind, ProbeError};
pub use report::{Report, ReportRow, RunStatus};
pub use security::SecurityFinding;
pub use transport::{Outcome, Transport, TransportRegistry};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
