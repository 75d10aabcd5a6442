//! TCP transport
//!
//! Plain DNS over TCP (RFC 1035) with a `deadpool` connection pool per
//! server address.

use std::net::SocketAddr;

use async_trait::async_trait;
use dashmap::DashMap;
use deadpool::managed::{self, Manager, Pool, RecycleError, RecycleResult};
use hickory_proto::op::Message;
use tokio::net::TcpStream;

use super::framing::pooled_exchange;
use super::traits::{Response, Transport};
use crate::config::{Protocol, Server};
use crate::error::{ProbeError, ProbeResult};

/// Default connection pool size per server
pub const DEFAULT_POOL_SIZE: usize = 4;

/// TCP connection manager for deadpool
#[derive(Debug)]
struct TcpConnectionManager {
    server_addr: SocketAddr,
}

#[async_trait]
impl Manager for TcpConnectionManager {
    type Type = TcpStream;
    type Error = ProbeError;

    async fn create(&self) -> Result<TcpStream, ProbeError> {
        let stream = TcpStream::connect(self.server_addr).await.map_err(|e| {
            ProbeError::network_io(
                format!("failed to connect to TCP DNS server {}", self.server_addr),
                e,
            )
        })?;
        // Disable Nagle's algorithm for lower latency
        stream.set_nodelay(true).ok();
        Ok(stream)
    }

    async fn recycle(
        &self,
        conn: &mut TcpStream,
        _metrics: &managed::Metrics,
    ) -> RecycleResult<ProbeError> {
        let mut buf = [0u8; 1];
        match conn.try_read(&mut buf) {
            // Idle and open
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
            Ok(0) => Err(RecycleError::Message(
                "TCP connection closed by server".to_string(),
            )),
            Ok(_) => Err(RecycleError::Message(
                "unexpected data on idle TCP connection".to_string(),
            )),
            Err(e) => Err(RecycleError::Message(format!(
                "TCP connection check failed: {e}"
            ))),
        }
    }
}

/// TCP transport with per-server connection pooling
pub struct TcpTransport {
    pools: DashMap<SocketAddr, Pool<TcpConnectionManager>>,
    pool_size: usize,
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("servers", &self.pools.len())
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

impl TcpTransport {
    /// Create a TCP transport holding up to `pool_size` connections per server
    pub fn new(pool_size: usize) -> Self {
        Self {
            pools: DashMap::new(),
            pool_size: pool_size.max(1),
        }
    }

    /// Pool status for a server address, if one was created
    pub fn pool_status(&self, addr: &SocketAddr) -> Option<deadpool::Status> {
        self.pools.get(addr).map(|pool| pool.status())
    }

    fn pool_for(&self, addr: SocketAddr) -> ProbeResult<Pool<TcpConnectionManager>> {
        if let Some(pool) = self.pools.get(&addr) {
            return Ok(pool.clone());
        }
        let entry = self.pools.entry(addr).or_try_insert_with(|| {
            Pool::builder(TcpConnectionManager { server_addr: addr })
                .max_size(self.pool_size)
                .build()
                .map_err(|e| ProbeError::protocol(format!("failed to create TCP pool: {e}")))
        })?;
        Ok(entry.value().clone())
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Tcp
    }

    async fn exchange(&self, server: &Server, query: &Message) -> ProbeResult<Response> {
        let pool = self.pool_for(server.address)?;
        pooled_exchange(&pool, query, &server.address.to_string()).await
    }
}
