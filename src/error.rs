//! Error types for dns-bench
//!
//! Two families of errors exist and they never mix:
//!
//! - [`ProbeError`]: everything that can go wrong while issuing a single
//!   query. These are captured at the point of occurrence, classified into a
//!   [`FailureKind`] and folded into outcomes and findings as data.
//! - [`ConfigError`]: precondition violations detected before any job is
//!   created. These are the only errors that abort a run.
//!
//! # Example
//!
//! ```
//! use dns_bench::error::{FailureKind, ProbeError};
//!
//! let err = ProbeError::timeout("UDP query to 192.0.2.1:53", std::time::Duration::from_secs(2));
//! assert_eq!(err.kind(), FailureKind::Timeout);
//! assert!(err.to_string().contains("timed out"));
//! ```

use std::fmt;
use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `EMFILE` / `ENFILE`: per-process and system-wide descriptor tables full.
const ERRNO_EMFILE: i32 = 24;
const ERRNO_ENFILE: i32 = 23;

/// Classification of a failed query or analysis step
///
/// The classification feeds loss-vs-error reporting: a report can tell a
/// resolver that silently drops queries apart from one that refuses
/// connections or answers garbage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// No response within the caller-supplied timeout
    Timeout,
    /// Connection could not be established or was torn down
    ConnectionRefused,
    /// A response arrived but could not be decoded or did not match the query
    MalformedResponse,
    /// Transport-level protocol failure (TLS handshake, HTTP status, ...)
    ProtocolError,
    /// DNSSEC chain present but failed verification
    VerificationFailed,
    /// Not enough trusted reference answers to reach a verdict
    InsufficientReferenceData,
}

impl FailureKind {
    /// All failure kinds, in reporting order
    pub const ALL: [FailureKind; 6] = [
        FailureKind::Timeout,
        FailureKind::ConnectionRefused,
        FailureKind::MalformedResponse,
        FailureKind::ProtocolError,
        FailureKind::VerificationFailed,
        FailureKind::InsufficientReferenceData,
    ];

    /// Stable kebab-case name used in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionRefused => "connection-refused",
            Self::MalformedResponse => "malformed-response",
            Self::ProtocolError => "protocol-error",
            Self::VerificationFailed => "verification-failed",
            Self::InsufficientReferenceData => "insufficient-reference-data",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type for single-query operations
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Error raised by a transport adapter for one query
///
/// Transport adapters never let these escape a probe: they are converted to
/// a failed [`Outcome`](crate::transport::Outcome) carrying
/// [`ProbeError::kind`].
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The exchange did not complete within the timeout
    #[error("DNS query timed out after {timeout:?}: {context}")]
    Timeout {
        /// What timed out
        context: String,
        /// The timeout that was exceeded
        timeout: Duration,
    },

    /// Connection refused, reset or otherwise unusable
    #[error("Connection failed: {reason}")]
    ConnectionRefused {
        /// Description of the failure
        reason: String,
        /// Underlying I/O error, if any
        #[source]
        source: Option<io::Error>,
    },

    /// The local host ran out of sockets or ports
    ///
    /// Classified as `connection-refused`; the scheduler additionally uses
    /// it to stop probing the affected server.
    #[error("Local resource exhaustion: {reason}")]
    LocalExhaustion {
        /// Description of the failure
        reason: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Response could not be decoded or did not match the query
    #[error("Malformed DNS response: {reason}")]
    MalformedResponse {
        /// Description of the problem
        reason: String,
    },

    /// TLS/HTTPS or other protocol-level failure
    #[error("Protocol error: {reason}")]
    ProtocolError {
        /// Description of the problem
        reason: String,
    },
}

impl ProbeError {
    // ========================================================================
    // Constructor methods
    // ========================================================================

    /// Create a timeout error
    pub fn timeout(context: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            context: context.into(),
            timeout,
        }
    }

    /// Create a connection error without an I/O source
    pub fn connection_refused(reason: impl Into<String>) -> Self {
        Self::ConnectionRefused {
            reason: reason.into(),
            source: None,
        }
    }

    /// Classify a socket-level I/O error
    ///
    /// Descriptor exhaustion and unavailable local addresses become
    /// [`ProbeError::LocalExhaustion`], timeouts become
    /// [`ProbeError::Timeout`], everything else is a connection failure.
    pub fn network_io(context: impl Into<String>, source: io::Error) -> Self {
        let context = context.into();

        if is_exhaustion(&source) {
            return Self::LocalExhaustion {
                reason: format!("{context}: {source}"),
                source,
            };
        }

        if source.kind() == io::ErrorKind::TimedOut {
            return Self::Timeout {
                context: format!("{context}: {source}"),
                timeout: Duration::ZERO,
            };
        }

        Self::ConnectionRefused {
            reason: format!("{context}: {source}"),
            source: Some(source),
        }
    }

    /// Create a malformed-response error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::ProtocolError {
            reason: reason.into(),
        }
    }

    // ========================================================================
    // Classification
    // ========================================================================

    /// Failure classification for reporting
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::ConnectionRefused { .. } | Self::LocalExhaustion { .. } => {
                FailureKind::ConnectionRefused
            }
            Self::MalformedResponse { .. } => FailureKind::MalformedResponse,
            Self::ProtocolError { .. } => FailureKind::ProtocolError,
        }
    }

    /// Whether the local host ran out of sockets while probing
    pub fn is_local_exhaustion(&self) -> bool {
        matches!(self, Self::LocalExhaustion { .. })
    }

    /// Whether a retry on a different connection may succeed
    ///
    /// Only connection-level failures qualify; timeouts have already used
    /// the caller's budget and decode failures would repeat.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ConnectionRefused { .. })
    }
}

fn is_exhaustion(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(ERRNO_EMFILE | ERRNO_ENFILE))
        || err.kind() == io::ErrorKind::AddrNotAvailable
}

/// Configuration-related errors
///
/// Raised only before any job is created.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The server list is empty
    #[error("Configuration validation failed: no servers configured")]
    NoServers,

    /// Validation error (invalid values, missing required fields)
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// File not found or inaccessible
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Environment variable error
    #[error("Environment variable error: {name}: {reason}")]
    EnvError { name: String, reason: String },

    /// Transport could not be initialised (e.g. TLS provider setup)
    #[error("Failed to initialise transport: {0}")]
    TransportInit(String),

    /// I/O error while reading config
    #[error("I/O error reading configuration: {0}")]
    Io(#[from] io::Error),
}

impl ConfigError {
    /// Shorthand for a validation error
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::ValidationError(reason.into())
    }
}
