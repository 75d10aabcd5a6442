//! Latency statistics and per-key rows

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::config::Protocol;
use crate::error::FailureKind;
use crate::scheduler::StatsKey;

/// Summary of a set of latency samples, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    /// Fastest sample
    pub min: f64,
    /// Slowest sample
    pub max: f64,
    /// Arithmetic mean
    pub mean: f64,
    /// Median; mean of the two middle samples for even counts
    pub median: f64,
    /// Sample standard deviation (n - 1); 0 for a single sample
    pub stddev: f64,
}

impl LatencySummary {
    /// Summarize samples, `None` when there are none
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let mean = mean(&sorted)?;
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };
        let stddev = if n < 2 {
            0.0
        } else {
            let sum_sq: f64 = sorted.iter().map(|x| (x - mean).powi(2)).sum();
            (sum_sq / (n - 1) as f64).sqrt()
        };

        Some(Self {
            min: sorted[0],
            max: sorted[n - 1],
            mean,
            median,
            stddev,
        })
    }
}

/// Arithmetic mean, `None` for no samples
pub fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        None
    } else {
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }
}

/// Split attempts into `(reliability %, loss %)`
///
/// The two always sum to exactly 100: the larger share is computed
/// directly and the smaller one as its complement, a subtraction that is
/// exact in binary floating point because the larger share lies in
/// [50, 100].
///
/// Returns `None` when nothing was sent.
///
/// ```
/// use dns_bench::aggregate::split_percentages;
///
/// let (reliability, loss) = split_percentages(1, 3).unwrap();
/// assert_eq!(reliability + loss, 100.0);
/// assert_eq!(split_percentages(0, 0), None);
/// ```
pub fn split_percentages(succeeded: u64, sent: u64) -> Option<(f64, f64)> {
    if sent == 0 {
        return None;
    }
    let succeeded = succeeded.min(sent);
    let failed = sent - succeeded;

    let share = |count: u64| count as f64 / sent as f64 * 100.0;
    if succeeded >= failed {
        let reliability = share(succeeded);
        Some((reliability, 100.0 - reliability))
    } else {
        let loss = share(failed);
        Some((100.0 - loss, loss))
    }
}

/// Statistics for one (server, protocol)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolStats {
    /// Server display name
    pub server: String,
    /// Protocol
    pub protocol: Protocol,
    /// Outcomes observed
    pub sent: u64,
    /// Outcomes with a decoded response
    pub succeeded: u64,
    /// Outcomes without one
    pub failed: u64,
    /// Latency over successes only
    pub latency: Option<LatencySummary>,
    /// Failed share of attempts, `None` with no attempts
    pub loss_pct: Option<f64>,
    /// Successful share of attempts, `None` with no attempts
    pub reliability_pct: Option<f64>,
    /// Failures by classification
    pub failures: BTreeMap<FailureKind, u64>,
    /// Successful responses by response code
    pub rcode_counts: BTreeMap<String, u64>,
    /// Mean latency of cache-warm queries
    pub cached_mean_ms: Option<f64>,
    /// Mean latency of cache-miss queries
    pub uncached_mean_ms: Option<f64>,
}

impl ProtocolStats {
    /// Row with no observations
    pub fn empty(key: &StatsKey) -> Self {
        Self {
            server: key.server.clone(),
            protocol: key.protocol,
            sent: 0,
            succeeded: 0,
            failed: 0,
            latency: None,
            loss_pct: None,
            reliability_pct: None,
            failures: BTreeMap::new(),
            rcode_counts: BTreeMap::new(),
            cached_mean_ms: None,
            uncached_mean_ms: None,
        }
    }

    /// Key of this row
    pub fn key(&self) -> StatsKey {
        StatsKey::new(self.server.clone(), self.protocol)
    }

    /// Fastest successful response
    pub fn min_ms(&self) -> Option<f64> {
        self.latency.map(|l| l.min)
    }

    /// Slowest successful response
    pub fn max_ms(&self) -> Option<f64> {
        self.latency.map(|l| l.max)
    }

    /// Mean latency of successes
    pub fn mean_ms(&self) -> Option<f64> {
        self.latency.map(|l| l.mean)
    }

    /// Median latency of successes
    pub fn median_ms(&self) -> Option<f64> {
        self.latency.map(|l| l.median)
    }

    /// Standard deviation of successful latencies
    pub fn stddev_ms(&self) -> Option<f64> {
        self.latency.map(|l| l.stddev)
    }

    /// Count of responses with a given response code name
    pub fn rcode_count(&self, name: &str) -> u64 {
        self.rcode_counts.get(name).copied().unwrap_or(0)
    }

    /// Whether every attempt failed
    pub fn is_total_loss(&self) -> bool {
        self.sent > 0 && self.succeeded == 0
    }
}

/// All rows of a run, ordered by key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsTable {
    entries: BTreeMap<StatsKey, ProtocolStats>,
}

impl StatsTable {
    pub(crate) fn insert(&mut self, stats: ProtocolStats) {
        self.entries.insert(stats.key(), stats);
    }

    /// Row for a key
    pub fn get(&self, key: &StatsKey) -> Option<&ProtocolStats> {
        self.entries.get(key)
    }

    /// Row for a server and protocol
    pub fn find(&self, server: &str, protocol: Protocol) -> Option<&ProtocolStats> {
        self.entries.get(&StatsKey::new(server, protocol))
    }

    /// Rows in key order
    pub fn iter(&self) -> impl Iterator<Item = &ProtocolStats> {
        self.entries.values()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total outcomes across all rows
    pub fn total_sent(&self) -> u64 {
        self.entries.values().map(|s| s.sent).sum()
    }
}

impl Serialize for StatsTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.values())
    }
}
