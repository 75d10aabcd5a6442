//! Per-protocol server ranking

use std::cmp::Ordering;

use serde::Serialize;

use super::stats::{ProtocolStats, StatsTable};
use crate::config::Protocol;

/// One line of a ranking
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    /// 1-based position
    pub rank: usize,
    /// Server display name
    pub server: String,
    /// Mean latency, absent for full-loss entries
    pub mean_ms: Option<f64>,
    /// Latency standard deviation
    pub stddev_ms: Option<f64>,
    /// Successful share of attempts
    pub reliability_pct: Option<f64>,
}

fn compare(a: &ProtocolStats, b: &ProtocolStats) -> Ordering {
    let by_mean = match (a.mean_ms(), b.mean_ms()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    let by_stddev = || match (a.stddev_ms(), b.stddev_ms()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        _ => Ordering::Equal,
    };

    by_mean
        .then_with(by_stddev)
        .then_with(|| a.server.cmp(&b.server))
}

/// Rank the servers measured over `protocol`
///
/// Ordered by mean latency; entries without any success come last. Ties
/// go to the lower standard deviation, then to the server name.
pub fn rank(table: &StatsTable, protocol: Protocol) -> Vec<RankedEntry> {
    let mut rows: Vec<&ProtocolStats> = table.iter().filter(|s| s.protocol == protocol).collect();
    rows.sort_by(|a, b| compare(a, b));

    rows.into_iter()
        .enumerate()
        .map(|(i, s)| RankedEntry {
            rank: i + 1,
            server: s.server.clone(),
            mean_ms: s.mean_ms(),
            stddev_ms: s.stddev_ms(),
            reliability_pct: s.reliability_pct,
        })
        .collect()
}
