//! Outcome accumulation
//!
//! Raw samples are kept per key and every statistic is recomputed from
//! them on demand, never patched incrementally.

use std::collections::BTreeMap;

use hickory_proto::op::ResponseCode;

use super::stats::{mean, split_percentages, LatencySummary, ProtocolStats, StatsTable};
use crate::error::FailureKind;
use crate::scheduler::{JobOutcome, QueryKind, StatsKey};

#[derive(Debug, Clone, Default)]
struct KeySamples {
    sent: u64,
    success_ms: Vec<f64>,
    cached_ms: Vec<f64>,
    uncached_ms: Vec<f64>,
    failures: BTreeMap<FailureKind, u64>,
    rcodes: BTreeMap<String, u64>,
}

impl KeySamples {
    fn to_stats(&self, key: &StatsKey) -> ProtocolStats {
        let succeeded = self.success_ms.len() as u64;
        let split = split_percentages(succeeded, self.sent);

        ProtocolStats {
            sent: self.sent,
            succeeded,
            failed: self.sent - succeeded,
            latency: LatencySummary::from_samples(&self.success_ms),
            reliability_pct: split.map(|(r, _)| r),
            loss_pct: split.map(|(_, l)| l),
            failures: self.failures.clone(),
            rcode_counts: self.rcodes.clone(),
            cached_mean_ms: mean(&self.cached_ms),
            uncached_mean_ms: mean(&self.uncached_ms),
            ..ProtocolStats::empty(key)
        }
    }
}

/// Lowercase response code name used in `rcode_counts`
///
/// ```
/// use dns_bench::aggregate::rcode_name;
/// use hickory_proto::op::ResponseCode;
///
/// assert_eq!(rcode_name(ResponseCode::ServFail), "servfail");
/// assert_eq!(rcode_name(ResponseCode::NXDomain), "nxdomain");
/// ```
pub fn rcode_name(rcode: ResponseCode) -> String {
    format!("{rcode:?}").to_ascii_lowercase()
}

/// Groups outcomes by (server, protocol)
///
/// Fed from a single consumer task, so it needs no locking.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    samples: BTreeMap<StatsKey, KeySamples>,
    observed: u64,
}

impl Aggregator {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregator pre-populated with expected keys
    ///
    /// Keys that never receive an outcome still appear in [`stats`](Self::stats)
    /// with zero attempts.
    pub fn with_keys(keys: impl IntoIterator<Item = StatsKey>) -> Self {
        Self {
            samples: keys
                .into_iter()
                .map(|k| (k, KeySamples::default()))
                .collect(),
            observed: 0,
        }
    }

    /// Record one outcome
    pub fn observe(&mut self, result: &JobOutcome) {
        let entry = self.samples.entry(result.job.key()).or_default();
        let outcome = &result.outcome;

        entry.sent += 1;
        self.observed += 1;

        if outcome.success {
            let ms = outcome.elapsed_ms();
            entry.success_ms.push(ms);
            match result.job.kind {
                QueryKind::Cached => entry.cached_ms.push(ms),
                QueryKind::Uncached => entry.uncached_ms.push(ms),
            }
            if let Some(rcode) = outcome.rcode {
                *entry.rcodes.entry(rcode_name(rcode)).or_default() += 1;
            }
        } else {
            let kind = outcome.failure.unwrap_or(FailureKind::ProtocolError);
            *entry.failures.entry(kind).or_default() += 1;
        }
    }

    /// Outcomes observed so far
    pub fn observed(&self) -> u64 {
        self.observed
    }

    /// Statistics for every key, recomputed from the samples
    pub fn stats(&self) -> StatsTable {
        let mut table = StatsTable::default();
        for (key, samples) in &self.samples {
            table.insert(samples.to_stats(key));
        }
        table
    }
}

/// Aggregate a finished set of outcomes
pub fn aggregate<'a>(outcomes: impl IntoIterator<Item = &'a JobOutcome>) -> StatsTable {
    let mut aggregator = Aggregator::new();
    for outcome in outcomes {
        aggregator.observe(outcome);
    }
    aggregator.stats()
}
