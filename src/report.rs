//! Benchmark report
//!
//! Read-only result of one run. The crate never formats output; callers
//! serialize the [`Report`] or export [`Report::rows`].

use serde::Serialize;

use crate::aggregate::{rank, ProtocolStats, RankedEntry, StatsTable};
use crate::config::Protocol;
use crate::security::SecurityFinding;

/// Whether the run finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum RunStatus {
    /// Every job reported
    Complete,
    /// The run was cancelled; statistics cover observed outcomes only
    Incomplete {
        /// Why the run stopped
        reason: String,
    },
}

impl RunStatus {
    /// Whether every job reported
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Result of one benchmark run
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Run status
    pub status: RunStatus,
    /// Wall-clock duration of the run
    pub duration_ms: u64,
    /// Jobs in the plan
    pub jobs_planned: usize,
    /// Outcomes aggregated
    pub outcomes_observed: u64,
    /// Highest number of jobs in flight at once
    pub peak_in_flight: usize,
    /// One row per (server, protocol)
    pub stats: StatsTable,
    /// One finding per server under test
    pub security: Vec<SecurityFinding>,
}

/// Flat export row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    /// Server display name
    pub server: String,
    /// Protocol of this row
    pub protocol: Protocol,
    /// Fastest successful query, in milliseconds
    pub min_ms: Option<f64>,
    /// Slowest successful query, in milliseconds
    pub max_ms: Option<f64>,
    /// Mean latency over successes
    pub mean_ms: Option<f64>,
    /// Median latency over successes
    pub median_ms: Option<f64>,
    /// Sample standard deviation over successes
    pub stddev_ms: Option<f64>,
    /// Share of attempts that failed, absent when nothing was sent
    pub loss_pct: Option<f64>,
    /// Share of attempts that succeeded, absent when nothing was sent
    pub reliability_pct: Option<f64>,
    /// DNSSEC status name
    ///
    /// Absent for trusted servers and when the security pass is disabled,
    /// as are the other two security fields.
    pub dnssec: Option<&'static str>,
    /// Hijack verdict name
    pub hijack: Option<&'static str>,
    /// Whether the cache probe saw an anomaly
    pub cache_anomaly: Option<bool>,
}

impl ReportRow {
    fn new(stats: &ProtocolStats, finding: Option<&SecurityFinding>) -> Self {
        Self {
            server: stats.server.clone(),
            protocol: stats.protocol,
            min_ms: stats.min_ms(),
            max_ms: stats.max_ms(),
            mean_ms: stats.mean_ms(),
            median_ms: stats.median_ms(),
            stddev_ms: stats.stddev_ms(),
            loss_pct: stats.loss_pct,
            reliability_pct: stats.reliability_pct,
            dnssec: finding.map(|f| f.dnssec.as_str()),
            hijack: finding.map(|f| f.hijack.as_str()),
            cache_anomaly: finding.map(|f| f.cache.is_anomalous()),
        }
    }
}

impl Report {
    /// Whether every job reported
    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }

    /// Security finding for a server
    pub fn finding(&self, server: &str) -> Option<&SecurityFinding> {
        self.security.iter().find(|f| f.server == server)
    }

    /// Export rows in (server, protocol) order
    pub fn rows(&self) -> Vec<ReportRow> {
        self.stats
            .iter()
            .map(|s| ReportRow::new(s, self.finding(&s.server)))
            .collect()
    }

    /// Servers ranked by mean latency over `protocol`
    pub fn rankings(&self, protocol: Protocol) -> Vec<RankedEntry> {
        rank(&self.stats, protocol)
    }
}
