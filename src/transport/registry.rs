//! Flat protocol-to-transport dispatch table

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::traits::{Outcome, ProbeRequest, Response, Transport};
use super::udp::UdpTransport;
use super::tcp::TcpTransport;
use crate::config::{Protocol, Server};
use crate::error::{ConfigError, FailureKind, ProbeError, ProbeResult};

/// Transports keyed by protocol
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use dns_bench::config::Protocol;
/// use dns_bench::transport::{TransportRegistry, UdpTransport};
///
/// let registry = TransportRegistry::new().with(Arc::new(UdpTransport::new()));
/// assert!(registry.get(Protocol::Udp).is_some());
/// assert!(registry.get(Protocol::Dot).is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransportRegistry {
    transports: HashMap<Protocol, Arc<dyn Transport>>,
}

impl TransportRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every compiled-in transport
    ///
    /// `pool_size` bounds pooled connections per server for TCP and `DoT`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::TransportInit` if TLS setup fails.
    pub fn with_defaults(pool_size: usize) -> Result<Self, ConfigError> {
        let mut registry = Self::new()
            .with(Arc::new(UdpTransport::new()))
            .with(Arc::new(TcpTransport::new(pool_size)));

        #[cfg(feature = "dot")]
        registry.register(Arc::new(super::dot::DotTransport::new(pool_size)?));

        #[cfg(feature = "doh")]
        registry.register(Arc::new(super::doh::DohTransport::new()?));

        debug!(protocols = ?registry.protocols(), "transport registry ready");
        Ok(registry)
    }

    /// Register a transport, replacing any previous one for its protocol
    pub fn register(&mut self, transport: Arc<dyn Transport>) -> Option<Arc<dyn Transport>> {
        self.transports.insert(transport.protocol(), transport)
    }

    /// Builder form of [`register`](Self::register)
    #[must_use]
    pub fn with(mut self, transport: Arc<dyn Transport>) -> Self {
        self.register(transport);
        self
    }

    /// Transport for a protocol
    pub fn get(&self, protocol: Protocol) -> Option<&Arc<dyn Transport>> {
        self.transports.get(&protocol)
    }

    /// Registered protocols, in reporting order
    pub fn protocols(&self) -> Vec<Protocol> {
        Protocol::ALL
            .into_iter()
            .filter(|p| self.transports.contains_key(p))
            .collect()
    }

    /// Send a request over `protocol`
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::ProtocolError` if no transport is registered for
    /// the protocol, otherwise whatever the transport returns.
    pub async fn query(
        &self,
        server: &Server,
        protocol: Protocol,
        request: &ProbeRequest,
        timeout: Duration,
    ) -> ProbeResult<Response> {
        let transport = self.get(protocol).ok_or_else(|| missing(protocol))?;
        transport.query(server, request, timeout).await
    }

    /// Probe `server` over `protocol`, never failing
    pub async fn probe(
        &self,
        server: &Server,
        protocol: Protocol,
        request: &ProbeRequest,
        timeout: Duration,
    ) -> Outcome {
        match self.get(protocol) {
            Some(transport) => transport.probe(server, request, timeout).await,
            None => Outcome::failed(FailureKind::ProtocolError, missing(protocol).to_string()),
        }
    }
}

fn missing(protocol: Protocol) -> ProbeError {
    ProbeError::protocol(format!("no transport registered for {protocol}"))
}
