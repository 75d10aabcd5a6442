//! UDP transport
//!
//! Plain DNS over UDP (RFC 1035). Each exchange binds a fresh ephemeral
//! socket, so no state is shared between probes.

use std::net::SocketAddr;
use std::time::Instant;

use async_trait::async_trait;
use hickory_proto::op::Message;
use tokio::net::UdpSocket;
use tracing::debug;

use super::traits::{decode_response, encode_query, Response, Transport};
use crate::config::{Protocol, Server};
use crate::error::{ProbeError, ProbeResult};

/// Maximum UDP response buffer size
///
/// 512 bytes without EDNS0, up to the advertised payload with it.
const UDP_RECV_BUFFER_SIZE: usize = 4096;

/// UDP transport
///
/// Datagrams from any address other than the server are ignored; the
/// caller's timeout bounds the wait for a valid reply.
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpTransport;

impl UdpTransport {
    /// Create a UDP transport
    pub fn new() -> Self {
        Self
    }
}

fn bind_addr(server: SocketAddr) -> SocketAddr {
    if server.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Udp
    }

    async fn exchange(&self, server: &Server, query: &Message) -> ProbeResult<Response> {
        let server_addr = server.address;
        let query_bytes = encode_query(query)?;

        let socket = UdpSocket::bind(bind_addr(server_addr))
            .await
            .map_err(|e| ProbeError::network_io("failed to bind UDP socket", e))?;

        let started = Instant::now();
        socket.send_to(&query_bytes, server_addr).await.map_err(|e| {
            ProbeError::network_io(format!("failed to send UDP query to {server_addr}"), e)
        })?;

        let mut recv_buf = vec![0u8; UDP_RECV_BUFFER_SIZE];
        loop {
            let (len, src) = socket.recv_from(&mut recv_buf).await.map_err(|e| {
                ProbeError::network_io(
                    format!("failed to receive UDP response from {server_addr}"),
                    e,
                )
            })?;

            if src != server_addr {
                debug!(
                    server = %server.name,
                    source = %src,
                    "ignoring datagram from unexpected source"
                );
                continue;
            }

            let response = decode_response(query, &recv_buf[..len])?;
            return Ok(Response::new(response, started));
        }
    }
}
