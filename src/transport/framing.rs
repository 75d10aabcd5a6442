//! Stream framing and pooled exchanges for TCP and DoT
//!
//! DNS over a byte stream prefixes every message with its length as a
//! two-byte big-endian integer (RFC 1035 section 4.2.2, reused by RFC 7858).
//! Both stream transports draw connections from a `deadpool` pool; the
//! helpers here run one exchange on a pooled connection, discarding the
//! connection unless the exchange completed cleanly.

use std::time::Instant;

use deadpool::managed::{Manager, Object, Pool, PoolError};
use hickory_proto::op::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::traits::{decode_response, encode_query, Response, MAX_TCP_MESSAGE_SIZE};
use crate::error::{ProbeError, ProbeResult};

/// Prefix a message with its two-byte length
pub(crate) fn frame(message: &[u8]) -> ProbeResult<Vec<u8>> {
    let len = u16::try_from(message.len()).map_err(|_| {
        ProbeError::protocol(format!(
            "query too large: {} bytes (max {MAX_TCP_MESSAGE_SIZE})",
            message.len()
        ))
    })?;

    let mut buf = Vec::with_capacity(2 + message.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(message);
    Ok(buf)
}

/// Write one framed message and read one framed reply
pub(crate) async fn exchange_framed<S>(stream: &mut S, framed: &[u8], peer: &str) -> ProbeResult<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    stream
        .write_all(framed)
        .await
        .map_err(|e| ProbeError::network_io(format!("failed to send query to {peer}"), e))?;
    stream
        .flush()
        .await
        .map_err(|e| ProbeError::network_io(format!("failed to flush query to {peer}"), e))?;

    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await.map_err(|e| {
        ProbeError::network_io(format!("failed to read response length from {peer}"), e)
    })?;

    let response_len = usize::from(u16::from_be_bytes(len_buf));
    if response_len == 0 {
        return Err(ProbeError::malformed(format!("empty response from {peer}")));
    }

    let mut response_buf = vec![0u8; response_len];
    stream.read_exact(&mut response_buf).await.map_err(|e| {
        ProbeError::network_io(format!("failed to read response body from {peer}"), e)
    })?;

    Ok(response_buf)
}

/// Pool checkout that discards its connection unless released cleanly
///
/// A future cancelled by the caller's timeout may leave a reply in flight on
/// the stream; such a connection must never go back to the pool.
struct Checkout<M: Manager> {
    object: Option<Object<M>>,
    clean: bool,
}

impl<M: Manager> Checkout<M> {
    fn new(object: Object<M>) -> Self {
        Self {
            object: Some(object),
            clean: false,
        }
    }

    fn stream(&mut self) -> Option<&mut M::Type> {
        self.object.as_deref_mut()
    }

    fn release(mut self) {
        self.clean = true;
    }
}

impl<M: Manager> Drop for Checkout<M> {
    fn drop(&mut self) {
        if !self.clean {
            if let Some(object) = self.object.take() {
                drop(Object::take(object));
            }
        }
    }
}

fn pool_error(peer: &str, err: PoolError<ProbeError>) -> ProbeError {
    match err {
        PoolError::Backend(e) => e,
        other => ProbeError::connection_refused(format!("connection pool for {peer}: {other}")),
    }
}

/// Run one query on a pooled stream connection
///
/// The clock starts before checkout, so connection establishment is timed
/// when the pool creates a fresh connection; it restarts after checkout when
/// an idle connection is reused. A connection-level failure on a reused
/// connection is retried once, since the server may have closed it while
/// idle.
pub(crate) async fn pooled_exchange<M>(
    pool: &Pool<M>,
    query: &Message,
    peer: &str,
) -> ProbeResult<Response>
where
    M: Manager<Error = ProbeError>,
    M::Type: AsyncRead + AsyncWrite + Unpin + Send,
{
    let framed = frame(&encode_query(query)?)?;
    let mut retried = false;

    loop {
        let mut started = Instant::now();
        let object = pool.get().await.map_err(|e| pool_error(peer, e))?;
        let reused = Object::metrics(&object).recycle_count > 0;
        if reused {
            started = Instant::now();
        }

        let mut checkout = Checkout::new(object);
        let result = match checkout.stream() {
            Some(stream) => exchange_framed(stream, &framed, peer)
                .await
                .and_then(|bytes| decode_response(query, &bytes)),
            None => Err(ProbeError::connection_refused(format!(
                "pooled connection to {peer} unavailable"
            ))),
        };

        match result {
            Ok(message) => {
                checkout.release();
                return Ok(Response::new(message, started));
            }
            Err(e) if reused && !retried && e.is_recoverable() => {
                debug!(peer = %peer, error = %e, "retrying on a fresh connection");
                retried = true;
            }
            Err(e) => return Err(e),
        }
    }
}
