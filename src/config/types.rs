//! Configuration types for a benchmark run
//!
//! # Configuration Structure
//!
//! ```text
//! BenchConfig
//! ├── servers: Vec<Server>
//! │   ├── name / address / protocols / tier
//! │   ├── dot: Option<DotEndpoint>
//! │   └── doh_url: Option<String>
//! ├── protocols / query_types / domains
//! ├── queries_per_test / timeout_secs / concurrency_limit
//! ├── uncached_queries / uncached_suffix
//! └── security: SecurityConfig
//! ```
//!
//! The configuration is fully resolved by the caller; nothing here parses
//! command lines.

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use hickory_proto::rr::{Name, RecordType};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default plain DNS port
pub const DEFAULT_DNS_PORT: u16 = 53;

/// Default `DoT` port (RFC 7858)
pub const DEFAULT_DOT_PORT: u16 = 853;

/// Upper bound accepted for `timeout_secs`
pub const MAX_TIMEOUT_SECS: f64 = 3600.0;

// ============================================================================
// Protocol
// ============================================================================

/// Wire protocol used to reach a server
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain UDP (RFC 1035)
    #[default]
    Udp,
    /// Plain TCP (RFC 1035)
    Tcp,
    /// DNS-over-HTTPS (RFC 8484)
    Doh,
    /// DNS-over-TLS (RFC 7858)
    Dot,
}

impl Protocol {
    /// All protocols, in reporting order
    pub const ALL: [Protocol; 4] = [Protocol::Udp, Protocol::Tcp, Protocol::Doh, Protocol::Dot];

    /// Whether the protocol is encrypted
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Doh | Self::Dot)
    }

    /// Lowercase protocol name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::Doh => "doh",
            Self::Dot => "dot",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "udp" => Ok(Self::Udp),
            "tcp" => Ok(Self::Tcp),
            "doh" | "https" => Ok(Self::Doh),
            "dot" | "tls" => Ok(Self::Dot),
            other => Err(ConfigError::invalid(format!("unknown protocol: {other}"))),
        }
    }
}

// ============================================================================
// Query type
// ============================================================================

/// Record type queried during a benchmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryType {
    A,
    Aaaa,
    Cname,
    Mx,
    Ns,
    Txt,
    Soa,
    Ptr,
    Srv,
    Caa,
    Https,
    Dnskey,
    Ds,
}

impl From<QueryType> for RecordType {
    fn from(qt: QueryType) -> Self {
        match qt {
            QueryType::A => RecordType::A,
            QueryType::Aaaa => RecordType::AAAA,
            QueryType::Cname => RecordType::CNAME,
            QueryType::Mx => RecordType::MX,
            QueryType::Ns => RecordType::NS,
            QueryType::Txt => RecordType::TXT,
            QueryType::Soa => RecordType::SOA,
            QueryType::Ptr => RecordType::PTR,
            QueryType::Srv => RecordType::SRV,
            QueryType::Caa => RecordType::CAA,
            QueryType::Https => RecordType::HTTPS,
            QueryType::Dnskey => RecordType::DNSKEY,
            QueryType::Ds => RecordType::DS,
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", RecordType::from(*self))
    }
}

// ============================================================================
// Server
// ============================================================================

/// Trust tier of a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrustTier {
    /// Reference resolver assumed to answer correctly
    Trusted,
    /// Resolver whose performance and trust are measured
    #[default]
    UnderTest,
}

/// DNS-over-TLS endpoint of a server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DotEndpoint {
    /// TLS socket address (usually port 853)
    pub address: SocketAddr,
    /// Server name used for SNI and certificate verification
    pub server_name: String,
}

/// A DNS server to benchmark
///
/// Immutable once constructed; the engine never mutates it.
///
/// # Example
///
/// ```
/// use dns_bench::config::{Protocol, Server};
///
/// let server = Server::new("Cloudflare", "1.1.1.1:53".parse().unwrap())
///     .with_protocols([Protocol::Udp, Protocol::Tcp, Protocol::Dot])
///     .with_dot("1.1.1.1:853".parse().unwrap(), "cloudflare-dns.com")
///     .trusted();
///
/// assert!(server.supports(Protocol::Dot));
/// assert!(!server.supports(Protocol::Doh));
/// assert!(server.is_trusted());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    /// Display name, unique within a run
    pub name: String,

    /// Plain DNS address used for UDP and TCP
    pub address: SocketAddr,

    /// Protocols this server should be benchmarked over
    #[serde(default = "default_server_protocols")]
    pub protocols: Vec<Protocol>,

    /// Trust tier
    #[serde(default)]
    pub tier: TrustTier,

    /// `DoT` endpoint, required for [`Protocol::Dot`]
    #[serde(default)]
    pub dot: Option<DotEndpoint>,

    /// `DoH` URL, required for [`Protocol::Doh`]
    #[serde(default)]
    pub doh_url: Option<String>,
}

fn default_server_protocols() -> Vec<Protocol> {
    vec![Protocol::Udp, Protocol::Tcp]
}

impl Server {
    /// Create a server reachable over UDP and TCP
    #[must_use]
    pub fn new(name: impl Into<String>, address: SocketAddr) -> Self {
        Self {
            name: name.into(),
            address,
            protocols: default_server_protocols(),
            tier: TrustTier::UnderTest,
            dot: None,
            doh_url: None,
        }
    }

    /// Replace the supported protocol set
    #[must_use]
    pub fn with_protocols(mut self, protocols: impl IntoIterator<Item = Protocol>) -> Self {
        self.protocols = protocols.into_iter().collect();
        self
    }

    /// Configure the `DoT` endpoint
    #[must_use]
    pub fn with_dot(mut self, address: SocketAddr, server_name: impl Into<String>) -> Self {
        self.dot = Some(DotEndpoint {
            address,
            server_name: server_name.into(),
        });
        self
    }

    /// Configure the `DoH` URL
    #[must_use]
    pub fn with_doh(mut self, url: impl Into<String>) -> Self {
        self.doh_url = Some(url.into());
        self
    }

    /// Mark this server as a trusted reference
    #[must_use]
    pub fn trusted(mut self) -> Self {
        self.tier = TrustTier::Trusted;
        self
    }

    /// Whether this server is a trusted reference
    pub fn is_trusted(&self) -> bool {
        self.tier == TrustTier::Trusted
    }

    /// Whether the server can be probed over `protocol`
    ///
    /// The protocol must be listed and its endpoint configured.
    pub fn supports(&self, protocol: Protocol) -> bool {
        if !self.protocols.contains(&protocol) {
            return false;
        }
        match protocol {
            Protocol::Udp | Protocol::Tcp => true,
            Protocol::Dot => self.dot.is_some(),
            Protocol::Doh => self.doh_url.is_some(),
        }
    }

    /// Validate the server definition
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the name is empty, no
    /// protocol is listed, or an encrypted protocol lacks its endpoint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("server name cannot be empty"));
        }

        if self.protocols.is_empty() {
            return Err(ConfigError::invalid(format!(
                "server '{}' lists no protocols",
                self.name
            )));
        }

        if self.protocols.contains(&Protocol::Dot) {
            match &self.dot {
                None => {
                    return Err(ConfigError::invalid(format!(
                        "server '{}' lists dot but has no DoT endpoint",
                        self.name
                    )))
                }
                Some(dot) if dot.server_name.trim().is_empty() => {
                    return Err(ConfigError::invalid(format!(
                        "server '{}' has an empty DoT server name",
                        self.name
                    )))
                }
                Some(_) => {}
            }
        }

        if self.protocols.contains(&Protocol::Doh) {
            match &self.doh_url {
                None => {
                    return Err(ConfigError::invalid(format!(
                        "server '{}' lists doh but has no DoH URL",
                        self.name
                    )))
                }
                Some(url) if !url.starts_with("https://") => {
                    return Err(ConfigError::invalid(format!(
                        "server '{}': DoH URL must use https, got {url}",
                        self.name
                    )))
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

// ============================================================================
// Security Configuration
// ============================================================================

/// Settings for the security pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Whether to run the security pass at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Protocol used for security queries
    #[serde(default)]
    pub protocol: Protocol,

    /// Domain known to be DNSSEC-signed
    #[serde(default = "default_dnssec_domain")]
    pub dnssec_domain: String,

    /// Record type validated under the signed domain
    #[serde(default = "default_a")]
    pub dnssec_query_type: QueryType,

    /// Domain compared across resolvers for hijack detection
    #[serde(default = "default_hijack_domain")]
    pub hijack_domain: String,

    /// Record type compared for hijack detection
    #[serde(default = "default_a")]
    pub hijack_query_type: QueryType,

    /// Minimum number of agreeing trusted references for a high-confidence majority
    ///
    /// Default: 2
    #[serde(default = "default_min_quorum")]
    pub min_quorum: usize,

    /// Domain queried twice for TTL decay analysis
    #[serde(default = "default_cache_domain")]
    pub cache_domain: String,

    /// Record type queried for TTL decay analysis
    #[serde(default = "default_a")]
    pub cache_query_type: QueryType,

    /// Delay between the two cache probes in milliseconds
    ///
    /// Default: 2000
    #[serde(default = "default_cache_probe_delay_ms")]
    pub cache_probe_delay_ms: u64,

    /// Allowed deviation between observed TTL decay and elapsed time, in seconds
    ///
    /// Default: 2
    #[serde(default = "default_ttl_tolerance_secs")]
    pub ttl_tolerance_secs: u32,
}

fn default_true() -> bool {
    true
}

fn default_a() -> QueryType {
    QueryType::A
}

fn default_dnssec_domain() -> String {
    "cloudflare.com".to_string()
}

fn default_hijack_domain() -> String {
    "example.com".to_string()
}

fn default_cache_domain() -> String {
    "google.com".to_string()
}

fn default_min_quorum() -> usize {
    2
}

fn default_cache_probe_delay_ms() -> u64 {
    2000
}

fn default_ttl_tolerance_secs() -> u32 {
    2
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            protocol: Protocol::Udp,
            dnssec_domain: default_dnssec_domain(),
            dnssec_query_type: default_a(),
            hijack_domain: default_hijack_domain(),
            hijack_query_type: default_a(),
            min_quorum: default_min_quorum(),
            cache_domain: default_cache_domain(),
            cache_query_type: default_a(),
            cache_probe_delay_ms: default_cache_probe_delay_ms(),
            ttl_tolerance_secs: default_ttl_tolerance_secs(),
        }
    }
}

impl SecurityConfig {
    /// Security pass switched off
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Delay between the two cache probes
    pub fn cache_probe_delay(&self) -> Duration {
        Duration::from_millis(self.cache_probe_delay_ms)
    }

    /// Validate the security settings
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for a zero quorum or an
    /// unparsable domain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_quorum == 0 {
            return Err(ConfigError::invalid("security.min_quorum must be at least 1"));
        }
        for domain in [&self.dnssec_domain, &self.hijack_domain, &self.cache_domain] {
            validate_domain(domain)?;
        }
        Ok(())
    }
}

// ============================================================================
// Benchmark Configuration
// ============================================================================

/// Fully-resolved configuration for one benchmark run
///
/// # Example
///
/// ```
/// use dns_bench::config::{BenchConfig, Server};
///
/// let config = BenchConfig::new(vec![Server::new("Google", "8.8.8.8:53".parse().unwrap())])
///     .with_queries_per_test(5);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.concurrency_limit, 32);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Servers to benchmark
    pub servers: Vec<Server>,

    /// Protocols to benchmark (intersected with each server's support)
    #[serde(default = "default_protocols")]
    pub protocols: Vec<Protocol>,

    /// Record types to query
    #[serde(default = "default_query_types")]
    pub query_types: Vec<QueryType>,

    /// Target domains
    #[serde(default = "default_domains")]
    pub domains: Vec<String>,

    /// Repetitions per (server, protocol, query type, domain)
    ///
    /// Default: 10
    #[serde(default = "default_queries_per_test")]
    pub queries_per_test: u32,

    /// Per-query timeout in seconds
    ///
    /// Default: 2.0
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,

    /// Maximum number of queries in flight
    ///
    /// Default: 32
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Also measure cache-miss latency with random names
    #[serde(default)]
    pub uncached_queries: bool,

    /// Parent zone for random cache-miss names
    #[serde(default = "default_uncached_suffix")]
    pub uncached_suffix: String,

    /// Security pass settings
    #[serde(default)]
    pub security: SecurityConfig,
}

fn default_protocols() -> Vec<Protocol> {
    vec![Protocol::Udp]
}

fn default_query_types() -> Vec<QueryType> {
    vec![QueryType::A]
}

fn default_domains() -> Vec<String> {
    vec!["google.com".to_string()]
}

fn default_queries_per_test() -> u32 {
    10
}

fn default_timeout_secs() -> f64 {
    2.0
}

fn default_concurrency_limit() -> usize {
    32
}

fn default_uncached_suffix() -> String {
    "com".to_string()
}

impl BenchConfig {
    /// Create a configuration with defaults for everything but the servers
    #[must_use]
    pub fn new(servers: Vec<Server>) -> Self {
        Self {
            servers,
            protocols: default_protocols(),
            query_types: default_query_types(),
            domains: default_domains(),
            queries_per_test: default_queries_per_test(),
            timeout_secs: default_timeout_secs(),
            concurrency_limit: default_concurrency_limit(),
            uncached_queries: false,
            uncached_suffix: default_uncached_suffix(),
            security: SecurityConfig::default(),
        }
    }

    /// Set the protocols to benchmark
    #[must_use]
    pub fn with_protocols(mut self, protocols: impl IntoIterator<Item = Protocol>) -> Self {
        self.protocols = protocols.into_iter().collect();
        self
    }

    /// Set the query types
    #[must_use]
    pub fn with_query_types(mut self, query_types: impl IntoIterator<Item = QueryType>) -> Self {
        self.query_types = query_types.into_iter().collect();
        self
    }

    /// Set the target domains
    #[must_use]
    pub fn with_domains<S: Into<String>>(mut self, domains: impl IntoIterator<Item = S>) -> Self {
        self.domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// Set repetitions per test
    #[must_use]
    pub fn with_queries_per_test(mut self, queries: u32) -> Self {
        self.queries_per_test = queries;
        self
    }

    /// Set the per-query timeout in seconds
    #[must_use]
    pub fn with_timeout_secs(mut self, timeout_secs: f64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set the concurrency limit
    #[must_use]
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    /// Enable cache-miss measurements
    #[must_use]
    pub fn with_uncached_queries(mut self, enabled: bool) -> Self {
        self.uncached_queries = enabled;
        self
    }

    /// Replace the security settings
    #[must_use]
    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }

    /// Per-query timeout
    ///
    /// Values outside `(0, MAX_TIMEOUT_SECS]` are clamped; [`validate`]
    /// rejects them first.
    ///
    /// [`validate`]: BenchConfig::validate
    pub fn timeout(&self) -> Duration {
        let secs = if self.timeout_secs.is_nan() {
            0.0
        } else {
            self.timeout_secs.clamp(0.0, MAX_TIMEOUT_SECS)
        };
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }

    /// Servers in the under-test tier
    pub fn servers_under_test(&self) -> impl Iterator<Item = &Server> {
        self.servers.iter().filter(|s| !s.is_trusted())
    }

    /// Trusted reference servers
    pub fn trusted_servers(&self) -> impl Iterator<Item = &Server> {
        self.servers.iter().filter(|s| s.is_trusted())
    }

    /// Validate the configuration
    ///
    /// This is the only place a run can be aborted: everything after this
    /// point degrades into report data instead of failing.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - the server list is empty
    /// - protocols, query types or domains are empty
    /// - `queries_per_test` or `concurrency_limit` is zero
    /// - the timeout is not a positive finite number of at most an hour
    /// - server names are duplicated or a server is invalid
    /// - no server supports any requested protocol
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::NoServers);
        }

        if self.protocols.is_empty() {
            return Err(ConfigError::invalid("at least one protocol is required"));
        }

        if self.query_types.is_empty() {
            return Err(ConfigError::invalid("at least one query type is required"));
        }

        if self.domains.is_empty() {
            return Err(ConfigError::invalid("at least one domain is required"));
        }

        for domain in &self.domains {
            validate_domain(domain)?;
        }

        if self.queries_per_test == 0 {
            return Err(ConfigError::invalid("queries_per_test must be positive"));
        }

        if !self.timeout_secs.is_finite() || self.timeout_secs <= 0.0 {
            return Err(ConfigError::invalid(format!(
                "timeout_secs must be a positive number, got {}",
                self.timeout_secs
            )));
        }

        if self.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::invalid(format!(
                "timeout_secs must be at most {MAX_TIMEOUT_SECS}, got {}",
                self.timeout_secs
            )));
        }

        if self.concurrency_limit == 0 {
            return Err(ConfigError::invalid("concurrency_limit must be positive"));
        }

        if self.uncached_queries {
            validate_domain(&self.uncached_suffix)?;
        }

        let mut names = HashSet::new();
        for server in &self.servers {
            server.validate()?;
            if !names.insert(server.name.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate server name: {}",
                    server.name
                )));
            }
        }

        let runnable = self
            .servers
            .iter()
            .any(|s| self.protocols.iter().any(|p| s.supports(*p)));
        if !runnable {
            return Err(ConfigError::invalid(
                "no server supports any of the requested protocols",
            ));
        }

        self.security.validate()
    }
}

/// Check that a domain parses as a DNS name
fn validate_domain(domain: &str) -> Result<(), ConfigError> {
    if domain.trim().is_empty() {
        return Err(ConfigError::invalid("domain cannot be empty"));
    }
    Name::from_ascii(domain)
        .map(|_| ())
        .map_err(|e| ConfigError::invalid(format!("invalid domain '{domain}': {e}")))
}
