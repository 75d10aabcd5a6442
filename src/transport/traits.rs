//! Transport trait and the values exchanged with it
//!
//! Every wire protocol implements [`Transport`]. The trait exposes one
//! required operation, [`Transport::exchange`], which sends an encoded query
//! and returns the decoded response. The provided methods layer the
//! caller-supplied timeout on top ([`Transport::query`]) and fold every
//! failure into an [`Outcome`] ([`Transport::probe`]), so callers of
//! `probe` never see an error.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use dns_bench::config::Server;
//! use dns_bench::transport::{ProbeRequest, Transport, UdpTransport};
//! use hickory_proto::rr::RecordType;
//!
//! # async fn example() {
//! let server = Server::new("Google", "8.8.8.8:53".parse().unwrap());
//! let request = ProbeRequest::new(RecordType::A, "example.com");
//!
//! let outcome = UdpTransport::new()
//!     .probe(&server, &request, Duration::from_secs(2))
//!     .await;
//! println!("success={} elapsed={:?}", outcome.success, outcome.elapsed);
//! # }
//! ```

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, Record, RecordType};

use crate::config::{Protocol, Server};
use crate::error::{FailureKind, ProbeError, ProbeResult};

/// Maximum DNS message size for TCP/DoH/DoT
pub const MAX_TCP_MESSAGE_SIZE: usize = 65535;

/// UDP payload size advertised in EDNS for DNSSEC queries
pub const EDNS_MAX_PAYLOAD: u16 = 4096;

// ============================================================================
// Request
// ============================================================================

/// A single question to put on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    /// Record type queried
    pub record_type: RecordType,
    /// Domain queried (a trailing dot is optional)
    pub domain: String,
    /// Set EDNS with the DO bit
    pub dnssec: bool,
}

impl ProbeRequest {
    /// Create a plain recursive query
    pub fn new(record_type: RecordType, domain: impl Into<String>) -> Self {
        Self {
            record_type,
            domain: domain.into(),
            dnssec: false,
        }
    }

    /// Request DNSSEC records (EDNS DO bit)
    #[must_use]
    pub fn with_dnssec(mut self) -> Self {
        self.dnssec = true;
        self
    }

    /// Build the wire message with a fresh random ID
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::ProtocolError` if the domain is not a valid name.
    pub fn to_message(&self) -> ProbeResult<Message> {
        let name = fqdn(&self.domain)?;

        let mut message = Message::new();
        message.set_id(rand::random());
        message.set_message_type(MessageType::Query);
        message.set_op_code(OpCode::Query);
        message.set_recursion_desired(true);
        message.add_query(Query::query(name, self.record_type));

        if self.dnssec {
            let mut edns = Edns::new();
            edns.set_dnssec_ok(true);
            edns.set_max_payload(EDNS_MAX_PAYLOAD);
            message.set_edns(edns);
        }

        Ok(message)
    }
}

/// Parse a domain as a fully-qualified name
pub(crate) fn fqdn(domain: &str) -> ProbeResult<Name> {
    let absolute = if domain.ends_with('.') {
        domain.to_string()
    } else {
        format!("{domain}.")
    };
    Name::from_ascii(&absolute)
        .map_err(|e| ProbeError::protocol(format!("invalid query name '{domain}': {e}")))
}

// ============================================================================
// Response
// ============================================================================

/// A decoded response and its timing
#[derive(Debug, Clone)]
pub struct Response {
    /// Decoded DNS message
    pub message: Message,
    /// Time from request dispatch to response receipt
    pub elapsed: Duration,
    /// When the response was received
    pub received_at: Instant,
}

impl Response {
    /// Stamp a response that arrived now, for a request dispatched at `started`
    pub fn new(message: Message, started: Instant) -> Self {
        let received_at = Instant::now();
        Self {
            message,
            elapsed: received_at.saturating_duration_since(started),
            received_at,
        }
    }

    /// Response code
    pub fn rcode(&self) -> ResponseCode {
        self.message.response_code()
    }

    /// Whether the server actually answered the question
    ///
    /// `NOERROR` and `NXDOMAIN` are answers. Anything else (`SERVFAIL`,
    /// `REFUSED`, ...) means the server declined to resolve.
    pub fn is_answered(&self) -> bool {
        matches!(self.rcode(), ResponseCode::NoError | ResponseCode::NXDomain)
    }

    /// Fail with a protocol error unless the server answered
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::ProtocolError` naming the response code.
    pub fn ensure_answered(self) -> ProbeResult<Self> {
        if self.is_answered() {
            Ok(self)
        } else {
            Err(ProbeError::protocol(format!(
                "server answered {}",
                self.rcode()
            )))
        }
    }

    /// Answer section as [`Answer`]s
    pub fn answers(&self) -> Vec<Answer> {
        self.message.answers().iter().map(Answer::from_record).collect()
    }
}

/// One decoded answer record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Owner name
    pub name: String,
    /// Record type
    pub record_type: RecordType,
    /// TTL in seconds
    pub ttl: u32,
    /// Presentation form of the record data
    pub data: String,
    /// Address for A/AAAA records
    pub address: Option<IpAddr>,
}

impl Answer {
    /// Convert a wire record
    pub fn from_record(record: &Record) -> Self {
        let address = match record.data() {
            Some(RData::A(a)) => Some(IpAddr::V4(a.0)),
            Some(RData::AAAA(aaaa)) => Some(IpAddr::V6(aaaa.0)),
            _ => None,
        };
        Self {
            name: record.name().to_ascii(),
            record_type: record.record_type(),
            ttl: record.ttl(),
            data: record.data().map(ToString::to_string).unwrap_or_default(),
            address,
        }
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Result of one probe, always produced and never an error
#[derive(Debug, Clone)]
pub struct Outcome {
    /// A DNS response was received and decoded
    pub success: bool,
    /// Dispatch to receipt, or to failure/timeout expiry
    pub elapsed: Duration,
    /// Response code of a successful probe
    pub rcode: Option<ResponseCode>,
    /// Decoded answers (possibly empty)
    pub answers: Vec<Answer>,
    /// Failure classification of a failed probe
    pub failure: Option<FailureKind>,
    /// Failure description
    pub error: Option<String>,
    /// The local host ran out of sockets or ports
    pub local_exhaustion: bool,
}

impl Outcome {
    /// Successful outcome from a response
    pub fn from_response(response: &Response) -> Self {
        Self {
            success: true,
            elapsed: response.elapsed,
            rcode: Some(response.rcode()),
            answers: response.answers(),
            failure: None,
            error: None,
            local_exhaustion: false,
        }
    }

    /// Failed outcome from a probe error
    pub fn from_error(error: &ProbeError, elapsed: Duration) -> Self {
        Self {
            success: false,
            elapsed,
            rcode: None,
            answers: Vec::new(),
            failure: Some(error.kind()),
            error: Some(error.to_string()),
            local_exhaustion: error.is_local_exhaustion(),
        }
    }

    /// Failed outcome that never touched the network
    pub fn failed(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            elapsed: Duration::ZERO,
            rcode: None,
            answers: Vec::new(),
            failure: Some(kind),
            error: Some(reason.into()),
            local_exhaustion: false,
        }
    }

    /// Elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    /// A/AAAA addresses in the answer section
    pub fn addresses(&self) -> BTreeSet<IpAddr> {
        self.answers.iter().filter_map(|a| a.address).collect()
    }
}

// ============================================================================
// Transport trait
// ============================================================================

/// A wire protocol able to carry DNS queries
///
/// Implementations own connection setup, request encoding and response
/// decoding for one protocol. They are shared across tasks and must be
/// stateless across calls except for connection reuse.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Protocol implemented by this transport
    fn protocol(&self) -> Protocol;

    /// Send `query` to `server` and await the matching response
    ///
    /// No timeout is applied here; [`Transport::query`] bounds the whole
    /// call. The returned elapsed time excludes connection setup only when
    /// an existing connection was reused.
    ///
    /// # Errors
    ///
    /// Returns a classified `ProbeError` on any failure.
    async fn exchange(&self, server: &Server, query: &Message) -> ProbeResult<Response>;

    /// Send a request with a timeout over the whole exchange
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::Timeout` when the timeout expires, or the
    /// error raised by [`Transport::exchange`].
    async fn query(
        &self,
        server: &Server,
        request: &ProbeRequest,
        timeout: Duration,
    ) -> ProbeResult<Response> {
        let query = request.to_message()?;
        match tokio::time::timeout(timeout, self.exchange(server, &query)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::timeout(
                format!("{} query to {}", self.protocol(), server.name),
                timeout,
            )),
        }
    }

    /// Issue one request and fold the result into an [`Outcome`]
    async fn probe(&self, server: &Server, request: &ProbeRequest, timeout: Duration) -> Outcome {
        let started = Instant::now();
        match self.query(server, request, timeout).await {
            Ok(response) => Outcome::from_response(&response),
            Err(e) => {
                tracing::debug!(
                    server = %server.name,
                    protocol = %self.protocol(),
                    domain = %request.domain,
                    error = %e,
                    "probe failed"
                );
                Outcome::from_error(&e, started.elapsed())
            }
        }
    }
}

/// Check that a response answers the query it was sent for
///
/// # Errors
///
/// Returns `ProbeError::ProtocolError` if the message is not a response, or
/// if its ID or question section differs from the query.
pub fn validate_response(query: &Message, response: &Message) -> ProbeResult<()> {
    if response.message_type() != MessageType::Response {
        return Err(ProbeError::protocol("received a query instead of a response"));
    }

    if query.id() != response.id() {
        return Err(ProbeError::protocol(format!(
            "response ID mismatch: sent {}, received {}",
            query.id(),
            response.id()
        )));
    }

    match (query.queries().first(), response.queries().first()) {
        (Some(q), Some(r)) => {
            if q.name() != r.name()
                || q.query_type() != r.query_type()
                || q.query_class() != r.query_class()
            {
                return Err(ProbeError::protocol(format!(
                    "response question mismatch: asked {} {}, got {} {}",
                    q.name(),
                    q.query_type(),
                    r.name(),
                    r.query_type()
                )));
            }
        }
        _ => return Err(ProbeError::protocol("response has no question section")),
    }

    Ok(())
}

/// Decode a response and validate it against the query
///
/// # Errors
///
/// `ProbeError::MalformedResponse` if the bytes do not decode, otherwise
/// the result of [`validate_response`].
pub(crate) fn decode_response(query: &Message, bytes: &[u8]) -> ProbeResult<Message> {
    let response = Message::from_vec(bytes)
        .map_err(|e| ProbeError::malformed(format!("failed to parse DNS response: {e}")))?;
    validate_response(query, &response)?;
    Ok(response)
}

/// Serialize a query
pub(crate) fn encode_query(query: &Message) -> ProbeResult<Vec<u8>> {
    query
        .to_vec()
        .map_err(|e| ProbeError::protocol(format!("failed to serialize DNS query: {e}")))
}
