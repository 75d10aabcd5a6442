//! Cache and TTL behaviour
//!
//! The same name is queried twice, a configurable delay apart. A resolver
//! answering from a live cache returns a TTL that decreased by roughly the
//! time between the two responses.

use std::time::Duration;

use hickory_proto::rr::RecordType;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::consensus::AnswerSet;
use crate::config::{Protocol, Server};
use crate::transport::{ProbeRequest, Response, TransportRegistry};

/// Unexpected cache behaviour; informational, never a security failure
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CacheAnomaly {
    /// Same TTL on both responses
    TtlNotDecreasing,
    /// Second TTL larger than the first
    TtlIncreased,
    /// TTL decreased, but not by the elapsed time
    UnexpectedDecay {
        /// Observed decrease in seconds
        observed_secs: i64,
        /// Time between the responses in seconds
        expected_secs: f64,
    },
    /// The two responses carried different answers
    AnswerChanged,
}

/// TTL observations of one server
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheBehavior {
    /// TTL of the first response
    pub first_ttl: Option<u32>,
    /// TTL of the second response
    pub second_ttl: Option<u32>,
    /// First minus second TTL
    pub observed_decay_secs: Option<i64>,
    /// Time between the two responses
    pub elapsed_secs: Option<f64>,
    /// Whether the second answer came from a live cache, `None` if unknown
    pub cache_hit: Option<bool>,
    /// Anomaly, if any
    pub anomaly: Option<CacheAnomaly>,
    /// Why the behaviour is unknown
    pub error: Option<String>,
}

impl CacheBehavior {
    /// Behaviour that could not be observed
    pub fn unknown(reason: impl Into<String>) -> Self {
        Self {
            first_ttl: None,
            second_ttl: None,
            observed_decay_secs: None,
            elapsed_secs: None,
            cache_hit: None,
            anomaly: None,
            error: Some(reason.into()),
        }
    }

    /// Whether an anomaly was flagged
    pub fn is_anomalous(&self) -> bool {
        self.anomaly.is_some()
    }

    /// Whether nothing could be concluded
    pub fn is_unknown(&self) -> bool {
        self.cache_hit.is_none()
    }
}

/// One cache probe response, reduced to what the analysis needs
#[derive(Debug, Clone, PartialEq)]
pub struct TtlSample {
    /// Lowest TTL of the answer RRset, `None` without answers
    pub ttl: Option<u32>,
    /// Normalized answer
    pub answers: AnswerSet,
}

impl TtlSample {
    /// Reduce a response to the records of `record_type`
    pub fn from_response(response: &Response, record_type: RecordType) -> Self {
        let answers = response.answers();
        Self {
            ttl: answers
                .iter()
                .filter(|a| a.record_type == record_type)
                .map(|a| a.ttl)
                .min(),
            answers: AnswerSet::from_answers(&answers, record_type),
        }
    }
}

/// Compare two samples taken `elapsed` apart
///
/// A decay within `tolerance_secs` of `elapsed` is a cache hit. A changed
/// answer set takes precedence over TTL anomalies.
pub fn analyze(
    first: &TtlSample,
    second: &TtlSample,
    elapsed: Duration,
    tolerance_secs: u32,
) -> CacheBehavior {
    let (Some(t1), Some(t2)) = (first.ttl, second.ttl) else {
        return CacheBehavior::unknown("no answer records to compare");
    };

    let decay = i64::from(t1) - i64::from(t2);
    let expected = elapsed.as_secs_f64();
    let deviation = (decay as f64 - expected).abs();

    let anomaly = if first.answers != second.answers {
        Some(CacheAnomaly::AnswerChanged)
    } else if decay < 0 {
        Some(CacheAnomaly::TtlIncreased)
    } else if deviation <= f64::from(tolerance_secs) {
        None
    } else if decay == 0 {
        Some(CacheAnomaly::TtlNotDecreasing)
    } else {
        Some(CacheAnomaly::UnexpectedDecay {
            observed_secs: decay,
            expected_secs: expected,
        })
    };

    CacheBehavior {
        first_ttl: Some(t1),
        second_ttl: Some(t2),
        observed_decay_secs: Some(decay),
        elapsed_secs: Some(expected),
        cache_hit: Some(anomaly.is_none()),
        anomaly,
        error: None,
    }
}

/// Parameters of a cache probe
#[derive(Debug, Clone)]
pub struct CacheProbe {
    /// Name queried twice
    pub domain: String,
    /// Record type queried
    pub record_type: RecordType,
    /// Pause between the two queries
    pub delay: Duration,
    /// Allowed deviation in seconds
    pub tolerance_secs: u32,
}

impl CacheProbe {
    /// Query `server` twice and analyze the TTLs
    ///
    /// Cancellation during the pause yields an unknown behaviour.
    pub async fn run(
        &self,
        registry: &TransportRegistry,
        server: &Server,
        protocol: Protocol,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> CacheBehavior {
        let request = ProbeRequest::new(self.record_type, self.domain.clone());

        let first = match registry
            .query(server, protocol, &request, timeout)
            .await
            .and_then(Response::ensure_answered)
        {
            Ok(response) => response,
            Err(e) => return failed(server, "first", &e),
        };

        tokio::select! {
            () = cancel.cancelled() => return CacheBehavior::unknown("cancelled"),
            () = tokio::time::sleep(self.delay) => {}
        }

        let second = match registry
            .query(server, protocol, &request, timeout)
            .await
            .and_then(Response::ensure_answered)
        {
            Ok(response) => response,
            Err(e) => return failed(server, "second", &e),
        };

        analyze(
            &TtlSample::from_response(&first, self.record_type),
            &TtlSample::from_response(&second, self.record_type),
            second.received_at.saturating_duration_since(first.received_at),
            self.tolerance_secs,
        )
    }
}

fn failed(server: &Server, which: &str, e: &crate::error::ProbeError) -> CacheBehavior {
    debug!(server = %server.name, probe = which, error = %e, "cache probe failed");
    CacheBehavior::unknown(format!("{}: {e}", e.kind()))
}
