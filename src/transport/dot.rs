//! DNS-over-TLS transport
//!
//! RFC 7858: the TCP framing of RFC 1035 inside a TLS session. Sessions are
//! pooled per (endpoint, server name) with `deadpool`; the TLS handshake is
//! therefore timed only on probes that open a new session.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use deadpool::managed::{self, Manager, Pool, RecycleError, RecycleResult};
use hickory_proto::op::Message;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use super::framing::pooled_exchange;
use super::tcp::DEFAULT_POOL_SIZE;
use super::tls::{client_config, server_name};
use super::traits::{Response, Transport};
use crate::config::{Protocol, Server};
use crate::error::{ConfigError, ProbeError, ProbeResult};

/// TLS connection wrapper for the pool
type TlsConnection = TlsStream<TcpStream>;

/// `DoT` connection manager for deadpool
struct DotConnectionManager {
    server_addr: SocketAddr,
    server_name: ServerName<'static>,
    tls_connector: TlsConnector,
}

#[async_trait]
impl Manager for DotConnectionManager {
    type Type = TlsConnection;
    type Error = ProbeError;

    async fn create(&self) -> Result<TlsConnection, ProbeError> {
        let tcp_stream = TcpStream::connect(self.server_addr).await.map_err(|e| {
            ProbeError::network_io(
                format!("failed to connect to DoT server {}", self.server_addr),
                e,
            )
        })?;
        tcp_stream.set_nodelay(true).ok();

        self.tls_connector
            .connect(self.server_name.clone(), tcp_stream)
            .await
            .map_err(|e| {
                ProbeError::protocol(format!(
                    "TLS handshake with {} failed: {e}",
                    self.server_addr
                ))
            })
    }

    async fn recycle(
        &self,
        conn: &mut TlsConnection,
        _metrics: &managed::Metrics,
    ) -> RecycleResult<ProbeError> {
        // TLS streams have no try_read; a very short read tells idle from closed
        let mut buf = [0u8; 1];
        match timeout(Duration::from_millis(1), conn.read(&mut buf)).await {
            Err(_) => Ok(()),
            Ok(Ok(0)) => Err(RecycleError::Message(
                "DoT connection closed by server".to_string(),
            )),
            Ok(Ok(_)) => Err(RecycleError::Message(
                "unexpected data on idle DoT connection".to_string(),
            )),
            Ok(Err(e)) => Err(RecycleError::Message(format!(
                "DoT connection check failed: {e}"
            ))),
        }
    }
}

/// `DoT` transport
///
/// Servers without a configured `DoT` endpoint fail with a protocol error.
pub struct DotTransport {
    tls_connector: TlsConnector,
    pools: DashMap<(SocketAddr, String), Pool<DotConnectionManager>>,
    pool_size: usize,
}

impl std::fmt::Debug for DotTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DotTransport")
            .field("endpoints", &self.pools.len())
            .field("pool_size", &self.pool_size)
            .finish_non_exhaustive()
    }
}

impl DotTransport {
    /// Create a `DoT` transport trusting the Mozilla root set
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::TransportInit` if TLS setup fails.
    pub fn new(pool_size: usize) -> Result<Self, ConfigError> {
        Ok(Self::with_tls_config(Arc::new(client_config()?), pool_size))
    }

    /// Create a `DoT` transport with a custom TLS client config
    pub fn with_tls_config(tls_config: Arc<ClientConfig>, pool_size: usize) -> Self {
        Self {
            tls_connector: TlsConnector::from(tls_config),
            pools: DashMap::new(),
            pool_size: pool_size.max(1),
        }
    }

    fn pool_for(&self, addr: SocketAddr, name: &str) -> ProbeResult<Pool<DotConnectionManager>> {
        let key = (addr, name.to_string());
        if let Some(pool) = self.pools.get(&key) {
            return Ok(pool.clone());
        }
        let server_name = server_name(name)?;
        let entry = self.pools.entry(key).or_try_insert_with(|| {
            let manager = DotConnectionManager {
                server_addr: addr,
                server_name,
                tls_connector: self.tls_connector.clone(),
            };
            Pool::builder(manager)
                .max_size(self.pool_size)
                .build()
                .map_err(|e| ProbeError::protocol(format!("failed to create DoT pool: {e}")))
        })?;
        Ok(entry.value().clone())
    }
}

#[async_trait]
impl Transport for DotTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Dot
    }

    async fn exchange(&self, server: &Server, query: &Message) -> ProbeResult<Response> {
        let endpoint = server.dot.as_ref().ok_or_else(|| {
            ProbeError::protocol(format!("server '{}' has no DoT endpoint", server.name))
        })?;
        let pool = self.pool_for(endpoint.address, &endpoint.server_name)?;
        let peer = format!("{} ({})", endpoint.address, endpoint.server_name);
        pooled_exchange(&pool, query, &peer).await
    }
}
