//! Shared fixtures: in-process DNS responders (plain, TLS and HTTPS) and
//! scripted transports

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dns_bench::config::{Protocol, Server};
use dns_bench::error::ProbeResult;
use dns_bench::transport::{Response, Transport};
use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{RData, Record};
use http::{header, Request, Response as HttpResponse, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http2;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

/// Builds a response for a decoded query
pub type Answerer = Arc<dyn Fn(&Message) -> Message + Send + Sync>;

/// Response skeleton echoing the query's ID and question
pub fn reply_to(query: &Message) -> Message {
    let mut response = Message::new();
    response.set_id(query.id());
    response.set_message_type(MessageType::Response);
    response.set_recursion_desired(query.recursion_desired());
    response.set_recursion_available(true);
    response.set_response_code(ResponseCode::NoError);
    response.add_queries(query.queries().to_vec());
    response
}

/// Answers every question with one A record
pub fn fixed_a(ip: Ipv4Addr, ttl: u32) -> Answerer {
    Arc::new(move |query: &Message| {
        let mut response = reply_to(query);
        if let Some(q) = query.queries().first() {
            response.add_answer(Record::from_rdata(q.name().clone(), ttl, RData::A(A(ip))));
        }
        response
    })
}

/// Answers every question with an empty response carrying `rcode`
pub fn rcode_only(rcode: ResponseCode) -> Answerer {
    Arc::new(move |query: &Message| {
        let mut response = reply_to(query);
        response.set_response_code(rcode);
        response
    })
}

/// Serve `answerer` over UDP on `addr`
pub async fn spawn_udp_at(addr: SocketAddr, answerer: Answerer) -> SocketAddr {
    let socket = UdpSocket::bind(addr).await.unwrap();
    let local = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        while let Ok((n, peer)) = socket.recv_from(&mut buf).await {
            let Ok(query) = Message::from_vec(&buf[..n]) else {
                continue;
            };
            let bytes = answerer(&query).to_vec().unwrap();
            let _ = socket.send_to(&bytes, peer).await;
        }
    });
    local
}

/// Bind a UDP socket on `addr` that never answers
pub async fn spawn_udp_blackhole(addr: SocketAddr) {
    let socket = UdpSocket::bind(addr).await.unwrap();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        while socket.recv_from(&mut buf).await.is_ok() {}
    });
}

/// Answer length-prefixed queries on one stream until it closes
async fn serve_framed<S>(mut stream: S, answerer: Answerer)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let mut len = [0u8; 2];
        if stream.read_exact(&mut len).await.is_err() {
            return;
        }
        let mut body = vec![0u8; usize::from(u16::from_be_bytes(len))];
        if stream.read_exact(&mut body).await.is_err() {
            return;
        }
        let Ok(query) = Message::from_vec(&body) else {
            return;
        };
        let bytes = answerer(&query).to_vec().unwrap();
        let Ok(len) = u16::try_from(bytes.len()) else {
            return;
        };
        if stream.write_all(&len.to_be_bytes()).await.is_err()
            || stream.write_all(&bytes).await.is_err()
            || stream.flush().await.is_err()
        {
            return;
        }
    }
}

/// Serve `answerer` over TCP with length-prefixed framing
pub async fn spawn_tcp(answerer: Answerer) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_framed(stream, Arc::clone(&answerer)));
        }
    });
    addr
}

/// A resolver answering on both UDP and TCP at the same port
pub async fn spawn_resolver(answerer: Answerer) -> SocketAddr {
    let addr = spawn_tcp(Arc::clone(&answerer)).await;
    spawn_udp_at(addr, answerer).await
}

/// A resolver answering over TCP while dropping every UDP query
pub async fn spawn_tcp_only_resolver(answerer: Answerer) -> SocketAddr {
    let addr = spawn_tcp(answerer).await;
    spawn_udp_blackhole(addr).await;
    addr
}

/// Self-signed certificate for `localhost`
pub struct TestCert {
    cert: CertificateDer<'static>,
    key: PrivatePkcs8KeyDer<'static>,
}

impl TestCert {
    pub fn localhost() -> Self {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        Self {
            cert: cert.der().clone(),
            key: PrivatePkcs8KeyDer::from(key_pair.serialize_der()),
        }
    }

    /// Client config trusting only this certificate
    pub fn client_config(&self) -> ClientConfig {
        let mut roots = RootCertStore::empty();
        roots.add(self.cert.clone()).unwrap();
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth()
    }

    fn acceptor(&self, alpn: &[&[u8]]) -> TlsAcceptor {
        let mut config =
            ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
                .with_safe_default_protocol_versions()
                .unwrap()
                .with_no_client_auth()
                .with_single_cert(
                    vec![self.cert.clone()],
                    PrivateKeyDer::Pkcs8(self.key.clone_key()),
                )
                .unwrap();
        config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();
        TlsAcceptor::from(Arc::new(config))
    }
}

/// Serve `answerer` over DNS-over-TLS
///
/// Returns the address and a count of accepted TCP connections.
pub async fn spawn_dot(cert: &TestCert, answerer: Answerer) -> (SocketAddr, Arc<AtomicUsize>) {
    let acceptor = cert.acceptor(&[]);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let acceptor = acceptor.clone();
            let answerer = Arc::clone(&answerer);
            tokio::spawn(async move {
                if let Ok(stream) = acceptor.accept(tcp).await {
                    serve_framed(stream, answerer).await;
                }
            });
        }
    });
    (addr, accepted)
}

async fn doh_reply(
    request: Request<Incoming>,
    answerer: Answerer,
) -> Result<HttpResponse<Full<Bytes>>, hyper::Error> {
    let body = request.into_body().collect().await?.to_bytes();
    let reply = match Message::from_vec(&body) {
        Ok(query) => HttpResponse::builder()
            .header(header::CONTENT_TYPE, "application/dns-message")
            .body(Full::new(Bytes::from(answerer(&query).to_vec().unwrap())))
            .unwrap(),
        Err(_) => HttpResponse::builder()
            .status(StatusCode::BAD_REQUEST)
            .body(Full::new(Bytes::new()))
            .unwrap(),
    };
    Ok(reply)
}

/// Serve `answerer` over DNS-over-HTTPS (HTTP/2, any path)
///
/// Returns the address and a count of accepted TCP connections.
pub async fn spawn_doh(cert: &TestCert, answerer: Answerer) -> (SocketAddr, Arc<AtomicUsize>) {
    let acceptor = cert.acceptor(&[b"h2"]);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let acceptor = acceptor.clone();
            let answerer = Arc::clone(&answerer);
            tokio::spawn(async move {
                let Ok(tls) = acceptor.accept(tcp).await else {
                    return;
                };
                let service =
                    service_fn(move |request| doh_reply(request, Arc::clone(&answerer)));
                let _ = http2::Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(tls), service)
                    .await;
            });
        }
    });
    (addr, accepted)
}

/// Transport answering every query itself after a fixed delay
///
/// Tracks how many exchanges are in flight, and can fire a cancellation
/// token once a given number of exchanges have completed.
#[derive(Debug)]
pub struct ScriptedTransport {
    protocol: Protocol,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    completed: AtomicUsize,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl ScriptedTransport {
    pub fn new(protocol: Protocol, delay: Duration) -> Self {
        Self {
            protocol,
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            cancel_after: None,
        }
    }

    /// Cancel `token` when the `n`th exchange completes
    pub fn cancel_after(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    async fn exchange(&self, _server: &Server, query: &Message) -> ProbeResult<Response> {
        let started = std::time::Instant::now();
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((n, token)) = &self.cancel_after {
            if done == *n {
                token.cancel();
            }
        }

        Ok(Response::new(reply_to(query), started))
    }
}

/// A server named `name` at a documentation address
pub fn server(name: &str) -> Server {
    Server::new(name, "192.0.2.53:53".parse().unwrap())
}
