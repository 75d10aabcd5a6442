//! Job expansion
//!
//! A benchmark configuration expands into one [`Job`] per
//! (server, protocol, query type, domain, repetition), plus cache-miss jobs
//! with random names when `uncached_queries` is set.

use std::fmt;
use std::sync::Arc;

use hickory_proto::rr::RecordType;
use rand::distributions::Uniform;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{BenchConfig, Protocol, QueryType, Server};
use crate::transport::ProbeRequest;

/// Length of the random label used for cache-miss queries
pub const UNCACHED_LABEL_LEN: usize = 8;

/// Whether a job targets a name the resolver has likely cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    /// Configured domain, warm after the first repetition
    Cached,
    /// Fresh random name, forces a recursive lookup
    Uncached,
}

/// Statistics key: one row per (server, protocol)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatsKey {
    /// Server display name
    pub server: String,
    /// Protocol
    pub protocol: Protocol,
}

impl StatsKey {
    /// Create a key
    pub fn new(server: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            server: server.into(),
            protocol,
        }
    }
}

impl fmt::Display for StatsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.server, self.protocol)
    }
}

/// One query to issue, consumed exactly once
#[derive(Debug, Clone)]
pub struct Job {
    /// Position in the plan
    pub id: usize,
    /// Target server
    pub server: Arc<Server>,
    /// Protocol to use
    pub protocol: Protocol,
    /// Record type
    pub query_type: QueryType,
    /// Domain to query
    pub domain: String,
    /// Cached or cache-miss measurement
    pub kind: QueryKind,
    /// Repetition index within its test
    pub sequence: u32,
}

impl Job {
    /// Statistics key this job reports into
    pub fn key(&self) -> StatsKey {
        StatsKey::new(self.server.name.clone(), self.protocol)
    }

    /// Wire request for this job
    pub fn request(&self) -> ProbeRequest {
        ProbeRequest::new(RecordType::from(self.query_type), self.domain.clone())
    }
}

/// Expanded job set and the statistics keys it will report into
#[derive(Debug, Clone, Default)]
pub struct JobPlan {
    /// Jobs in submission order
    pub jobs: Vec<Job>,
    /// Every (server, protocol) pair with at least one job
    pub keys: Vec<StatsKey>,
}

impl JobPlan {
    /// Expand a configuration
    ///
    /// Protocols a server does not support are skipped for that server.
    pub fn expand(config: &BenchConfig) -> Self {
        let mut rng = rand::thread_rng();
        let mut plan = Self::default();

        for server in &config.servers {
            let server = Arc::new(server.clone());

            for &protocol in &config.protocols {
                if !server.supports(protocol) {
                    debug!(
                        server = %server.name,
                        protocol = %protocol,
                        "protocol not supported by server, skipping"
                    );
                    continue;
                }
                plan.keys.push(StatsKey::new(server.name.clone(), protocol));

                for &query_type in &config.query_types {
                    for domain in &config.domains {
                        for sequence in 0..config.queries_per_test {
                            plan.push(
                                &server,
                                protocol,
                                query_type,
                                domain.clone(),
                                QueryKind::Cached,
                                sequence,
                            );
                        }
                    }

                    if config.uncached_queries {
                        for sequence in 0..config.queries_per_test {
                            let domain = random_name(&mut rng, &config.uncached_suffix);
                            plan.push(
                                &server,
                                protocol,
                                query_type,
                                domain,
                                QueryKind::Uncached,
                                sequence,
                            );
                        }
                    }
                }
            }
        }

        info!(
            jobs = plan.jobs.len(),
            keys = plan.keys.len(),
            "benchmark plan expanded"
        );
        plan
    }

    fn push(
        &mut self,
        server: &Arc<Server>,
        protocol: Protocol,
        query_type: QueryType,
        domain: String,
        kind: QueryKind,
        sequence: u32,
    ) {
        self.jobs.push(Job {
            id: self.jobs.len(),
            server: Arc::clone(server),
            protocol,
            query_type,
            domain,
            kind,
            sequence,
        });
    }

    /// Number of jobs
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the plan has no jobs
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Random lowercase label under `suffix`, e.g. `qwhzkrtm.com`
pub fn random_name(rng: &mut impl Rng, suffix: &str) -> String {
    let letters = Uniform::new_inclusive(b'a', b'z');
    let label: String = (0..UNCACHED_LABEL_LEN)
        .map(|_| char::from(rng.sample(letters)))
        .collect();
    format!("{label}.{}", suffix.trim_matches('.'))
}
