//! Hijack detection by comparison with trusted references

use std::time::Duration;

use futures::future::join_all;
use hickory_proto::rr::RecordType;
use serde::Serialize;
use tracing::debug;

use super::consensus::{AnswerSet, Consensus, ConsensusPolicy};
use crate::config::{Protocol, Server};
use crate::error::FailureKind;
use crate::transport::{ProbeRequest, Response, TransportRegistry};

/// How much weight a suspicion carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Contradicts a quorum majority of references
    High,
    /// Contradicts the only reference that answered
    Low,
}

/// Hijack verdict for one server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "kebab-case")]
pub enum HijackVerdict {
    /// Answer agrees with the references
    None,
    /// Answer disagrees with the references
    Suspected {
        /// The tested server's answer
        evidence: AnswerSet,
        /// What the references agreed on
        expected: AnswerSet,
        /// Strength of the suspicion
        confidence: Confidence,
    },
    /// No verdict possible
    Indeterminate {
        /// Failure that prevented a verdict
        reason: FailureKind,
    },
    /// The check never ran
    Skipped {
        /// Why it did not run
        reason: String,
    },
}

impl HijackVerdict {
    /// Short verdict name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Suspected { .. } => "suspected",
            Self::Indeterminate { .. } => "indeterminate",
            Self::Skipped { .. } => "skipped",
        }
    }

    /// Whether the server is suspected of tampering
    pub fn is_suspected(&self) -> bool {
        matches!(self, Self::Suspected { .. })
    }

    fn suspected(evidence: &AnswerSet, expected: AnswerSet, confidence: Confidence) -> Self {
        Self::Suspected {
            evidence: evidence.clone(),
            expected,
            confidence,
        }
    }
}

/// Judge a tested answer against the reference answers
///
/// `tested` is the tested server's normalized answer or the failure kind of
/// its query. `references` holds the answers of the references that
/// responded.
pub fn judge(
    tested: &Result<AnswerSet, FailureKind>,
    references: &[AnswerSet],
    policy: ConsensusPolicy,
) -> HijackVerdict {
    let tested = match tested {
        Ok(set) => set,
        Err(kind) => return HijackVerdict::Indeterminate { reason: *kind },
    };

    match policy.decide(references) {
        Consensus::Majority { set, .. } if &set == tested => HijackVerdict::None,
        Consensus::Majority { set, .. } => HijackVerdict::suspected(tested, set, Confidence::High),
        Consensus::Single(set) if &set == tested => HijackVerdict::None,
        Consensus::Single(set) => HijackVerdict::suspected(tested, set, Confidence::Low),
        Consensus::Split | Consensus::NoData => HijackVerdict::Indeterminate {
            reason: FailureKind::InsufficientReferenceData,
        },
    }
}

/// Query `server` and normalize its answer
///
/// # Errors
///
/// Returns the failure kind of the query. A refusal or `SERVFAIL` is a
/// protocol error, not an empty answer.
pub async fn observe(
    registry: &TransportRegistry,
    server: &Server,
    protocol: Protocol,
    request: &ProbeRequest,
    timeout: Duration,
) -> Result<AnswerSet, FailureKind> {
    let result = registry
        .query(server, protocol, request, timeout)
        .await
        .and_then(Response::ensure_answered);
    match result {
        Ok(response) => Ok(AnswerSet::from_answers(
            &response.answers(),
            request.record_type,
        )),
        Err(e) => {
            debug!(
                server = %server.name,
                protocol = %protocol,
                error = %e,
                "hijack probe failed"
            );
            Err(e.kind())
        }
    }
}

/// Query every reference concurrently, keeping the answers that arrived
pub async fn reference_answers(
    registry: &TransportRegistry,
    references: &[(&Server, Protocol)],
    domain: &str,
    record_type: RecordType,
    timeout: Duration,
) -> Vec<AnswerSet> {
    let request = ProbeRequest::new(record_type, domain);
    let results = join_all(
        references
            .iter()
            .map(|(server, protocol)| observe(registry, server, *protocol, &request, timeout)),
    )
    .await;

    let answers: Vec<AnswerSet> = results.into_iter().filter_map(Result::ok).collect();
    debug!(
        references = references.len(),
        responding = answers.len(),
        "reference answers collected"
    );
    answers
}
