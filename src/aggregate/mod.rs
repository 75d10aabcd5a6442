//! Result aggregation
//!
//! Outcomes are grouped per (server, protocol) into [`ProtocolStats`].
//! Latency is summarized over successes only; loss and reliability are
//! shares of all attempts and always sum to exactly 100.
//!
//! # Example
//!
//! ```no_run
//! use dns_bench::aggregate::{rank, Aggregator};
//! use dns_bench::config::Protocol;
//! # fn outcomes() -> Vec<dns_bench::scheduler::JobOutcome> { Vec::new() }
//!
//! let mut aggregator = Aggregator::new();
//! for outcome in outcomes() {
//!     aggregator.observe(&outcome);
//! }
//! let table = aggregator.stats();
//! for entry in rank(&table, Protocol::Udp) {
//!     println!("{}. {} {:?}", entry.rank, entry.server, entry.mean_ms);
//! }
//! ```

mod aggregator;
mod ranking;
mod stats;

pub use aggregator::{aggregate, rcode_name, Aggregator};
pub use ranking::{rank, RankedEntry};
pub use stats::{mean, split_percentages, LatencySummary, ProtocolStats, StatsTable};
