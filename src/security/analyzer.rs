//! Security pass orchestration

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use hickory_proto::rr::RecordType;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cache::{CacheBehavior, CacheProbe};
use super::consensus::{AnswerSet, ConsensusPolicy};
use super::dnssec::{check_dnssec, ChainVerifier, DnssecStatus, HickoryVerifier};
use super::hijack::{judge, observe, reference_answers, HijackVerdict};
use crate::config::{Protocol, SecurityConfig, Server};
use crate::error::FailureKind;
use crate::transport::{ProbeRequest, TransportRegistry};

/// Security findings for one server under test
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityFinding {
    /// Server display name
    pub server: String,
    /// Protocol the security queries used
    pub protocol: Option<Protocol>,
    /// DNSSEC validation result
    pub dnssec: DnssecStatus,
    /// Hijack verdict
    pub hijack: HijackVerdict,
    /// Cache and TTL behaviour
    pub cache: CacheBehavior,
}

impl SecurityFinding {
    /// Finding for a server that could not be analyzed at all
    pub fn indeterminate(server: &Server, kind: FailureKind, reason: &str) -> Self {
        Self {
            server: server.name.clone(),
            protocol: None,
            dnssec: DnssecStatus::Indeterminate {
                reason: format!("{kind}: {reason}"),
            },
            hijack: HijackVerdict::Indeterminate { reason: kind },
            cache: CacheBehavior::unknown(format!("{kind}: {reason}")),
        }
    }

    /// Finding for a server whose checks never ran
    pub fn skipped(server: &Server, reason: &str) -> Self {
        Self {
            server: server.name.clone(),
            protocol: None,
            dnssec: DnssecStatus::Indeterminate {
                reason: reason.to_string(),
            },
            hijack: HijackVerdict::Skipped {
                reason: reason.to_string(),
            },
            cache: CacheBehavior::unknown(reason),
        }
    }
}

/// Per-server results gathered before the hijack verdict
struct Observation {
    server: String,
    protocol: Protocol,
    dnssec: DnssecStatus,
    tested: Result<AnswerSet, FailureKind>,
    cache: CacheBehavior,
}

/// Runs DNSSEC, hijack and cache analyses for every server under test
///
/// All analyses for all servers run concurrently; a failure degrades only
/// the finding it affects.
#[derive(Debug, Clone)]
pub struct SecurityAnalyzer {
    registry: Arc<TransportRegistry>,
    config: SecurityConfig,
    timeout: Duration,
    verifier: Arc<dyn ChainVerifier>,
}

impl SecurityAnalyzer {
    /// Create an analyzer using the `hickory-proto` DNSSEC verifier
    pub fn new(registry: Arc<TransportRegistry>, config: SecurityConfig, timeout: Duration) -> Self {
        Self {
            registry,
            config,
            timeout,
            verifier: Arc::new(HickoryVerifier),
        }
    }

    /// Replace the DNSSEC verifier
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn ChainVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Security settings in use
    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Protocol used for security queries against `server`
    ///
    /// The configured protocol when the server supports it, otherwise the
    /// first protocol the server supports.
    pub fn protocol_for(&self, server: &Server) -> Option<Protocol> {
        if server.supports(self.config.protocol) {
            return Some(self.config.protocol);
        }
        server.protocols.iter().copied().find(|p| server.supports(*p))
    }

    /// Analyze every server in `servers` that is not trusted
    ///
    /// Trusted servers serve as references. Returns one finding per server
    /// under test, in input order. If `cancel` has fired before the pass
    /// starts, every finding is indeterminate.
    pub async fn analyze(&self, servers: &[Server], cancel: &CancellationToken) -> Vec<SecurityFinding> {
        let under_test: Vec<&Server> = servers.iter().filter(|s| !s.is_trusted()).collect();

        if cancel.is_cancelled() {
            return under_test
                .into_iter()
                .map(|s| SecurityFinding::skipped(s, "cancelled"))
                .collect();
        }

        let references: Vec<(&Server, Protocol)> = servers
            .iter()
            .filter(|s| s.is_trusted())
            .filter_map(|s| self.protocol_for(s).map(|p| (s, p)))
            .collect();

        info!(
            servers = under_test.len(),
            references = references.len(),
            "security analysis starting"
        );
        if references.is_empty() {
            warn!("no trusted reference servers, hijack verdicts will be indeterminate");
        }

        let hijack_type = RecordType::from(self.config.hijack_query_type);
        let (reference_sets, observations) = tokio::join!(
            reference_answers(
                &self.registry,
                &references,
                &self.config.hijack_domain,
                hijack_type,
                self.timeout,
            ),
            join_all(under_test.iter().map(|s| self.observe_server(s, cancel))),
        );

        let policy = ConsensusPolicy::new(self.config.min_quorum);
        under_test
            .into_iter()
            .zip(observations)
            .map(|(server, observation)| match observation {
                Some(o) => {
                    let hijack = judge(&o.tested, &reference_sets, policy);
                    debug!(
                        server = %o.server,
                        dnssec = o.dnssec.as_str(),
                        hijack = hijack.as_str(),
                        cache_anomaly = o.cache.is_anomalous(),
                        "security finding"
                    );
                    SecurityFinding {
                        server: o.server,
                        protocol: Some(o.protocol),
                        dnssec: o.dnssec,
                        hijack,
                        cache: o.cache,
                    }
                }
                None => SecurityFinding::indeterminate(
                    server,
                    FailureKind::ProtocolError,
                    "server supports no usable protocol",
                ),
            })
            .collect()
    }

    async fn observe_server(&self, server: &Server, cancel: &CancellationToken) -> Option<Observation> {
        let protocol = self.protocol_for(server)?;
        let config = &self.config;

        let hijack_request = ProbeRequest::new(
            RecordType::from(config.hijack_query_type),
            config.hijack_domain.clone(),
        );
        let cache_probe = CacheProbe {
            domain: config.cache_domain.clone(),
            record_type: RecordType::from(config.cache_query_type),
            delay: config.cache_probe_delay(),
            tolerance_secs: config.ttl_tolerance_secs,
        };

        let (dnssec, tested, cache) = tokio::join!(
            check_dnssec(
                &self.registry,
                server,
                protocol,
                &config.dnssec_domain,
                RecordType::from(config.dnssec_query_type),
                self.timeout,
                self.verifier.as_ref(),
            ),
            observe(&self.registry, server, protocol, &hijack_request, self.timeout),
            cache_probe.run(&self.registry, server, protocol, self.timeout, cancel),
        );

        Some(Observation {
            server: server.name.clone(),
            protocol,
            dnssec,
            tested,
            cache,
        })
    }
}
