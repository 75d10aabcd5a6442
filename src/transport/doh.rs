//! DNS-over-HTTPS transport
//!
//! RFC 8484 POST requests with `application/dns-message` bodies over a
//! single shared HTTP/2 client. Connection reuse is left to hyper's pool.

use std::error::Error as StdError;
use std::io;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use hickory_proto::op::Message;
use http::{header, Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rustls::ClientConfig;

use super::tls::client_config;
use super::traits::{decode_response, encode_query, Response, Transport, MAX_TCP_MESSAGE_SIZE};
use crate::config::{Protocol, Server};
use crate::error::{ConfigError, ProbeError, ProbeResult};

/// `DoH` content type for DNS wire format
const DOH_CONTENT_TYPE: &str = "application/dns-message";

type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// `DoH` transport
///
/// Servers without a configured `DoH` URL fail with a protocol error.
pub struct DohTransport {
    client: HttpsClient,
}

impl std::fmt::Debug for DohTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DohTransport").finish_non_exhaustive()
    }
}

impl DohTransport {
    /// Create a `DoH` transport trusting the Mozilla root set
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::TransportInit` if TLS setup fails.
    pub fn new() -> Result<Self, ConfigError> {
        Ok(Self::with_tls_config(client_config()?))
    }

    /// Create a `DoH` transport with a custom TLS client config
    pub fn with_tls_config(tls_config: ClientConfig) -> Self {
        let https = HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_only()
            .enable_http2()
            .build();

        let client = Client::builder(TokioExecutor::new())
            .http2_only(true)
            .build(https);

        Self { client }
    }
}

/// Whether a TLS failure appears anywhere in an error's source chain
fn is_tls_failure(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.downcast_ref::<rustls::Error>().is_some() {
            return true;
        }
        if let Some(inner) = e
            .downcast_ref::<io::Error>()
            .and_then(io::Error::get_ref)
        {
            if inner.downcast_ref::<rustls::Error>().is_some() {
                return true;
            }
        }
        current = e.source();
    }
    false
}

/// First I/O error in an error's source chain
fn find_io_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a io::Error> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            return Some(io_err);
        }
        current = e.source();
    }
    None
}

fn classify_request_error(uri: &Uri, err: &hyper_util::client::legacy::Error) -> ProbeError {
    let context = format!("DoH request to {uri}");

    if is_tls_failure(err) {
        return ProbeError::protocol(format!("{context}: TLS failure: {err}"));
    }

    if let Some(io_err) = find_io_error(err) {
        let copy = io_err.raw_os_error().map_or_else(
            || io::Error::new(io_err.kind(), io_err.to_string()),
            io::Error::from_raw_os_error,
        );
        return ProbeError::network_io(context, copy);
    }

    if err.is_connect() {
        return ProbeError::connection_refused(format!("{context}: {err}"));
    }

    ProbeError::protocol(format!("{context}: {err}"))
}

#[async_trait]
impl Transport for DohTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Doh
    }

    async fn exchange(&self, server: &Server, query: &Message) -> ProbeResult<Response> {
        let url = server.doh_url.as_deref().ok_or_else(|| {
            ProbeError::protocol(format!("server '{}' has no DoH URL", server.name))
        })?;
        let uri: Uri = url
            .parse()
            .map_err(|e| ProbeError::protocol(format!("invalid DoH URL '{url}': {e}")))?;

        let query_bytes = encode_query(query)?;
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri.clone())
            .header(header::CONTENT_TYPE, DOH_CONTENT_TYPE)
            .header(header::ACCEPT, DOH_CONTENT_TYPE)
            .header(header::CONTENT_LENGTH, query_bytes.len())
            .body(Full::new(Bytes::from(query_bytes)))
            .map_err(|e| ProbeError::protocol(format!("failed to build DoH request: {e}")))?;

        let started = Instant::now();
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| classify_request_error(&uri, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::protocol(format!(
                "DoH request to {uri} returned HTTP {status}"
            )));
        }

        if let Some(content_type) = response.headers().get(header::CONTENT_TYPE) {
            let ct = content_type.to_str().unwrap_or("");
            if !ct.starts_with(DOH_CONTENT_TYPE) {
                return Err(ProbeError::protocol(format!(
                    "unexpected Content-Type from {uri}: {ct}"
                )));
            }
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| ProbeError::connection_refused(format!("failed to read DoH body: {e}")))?
            .to_bytes();

        if body.len() > MAX_TCP_MESSAGE_SIZE {
            return Err(ProbeError::malformed(format!(
                "DoH response too large: {} bytes (max {MAX_TCP_MESSAGE_SIZE})",
                body.len()
            )));
        }

        let message = decode_response(query, &body)?;
        Ok(Response::new(message, started))
    }
}
