//! DoT and DoH exchanges against in-process TLS responders

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dns_bench::config::{Protocol, Server};
use dns_bench::transport::{DohTransport, DotTransport, ProbeRequest, Transport, DEFAULT_POOL_SIZE};
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::RecordType;

use super::support::{fixed_a, rcode_only, spawn_doh, spawn_dot, TestCert};

const ANSWER_IP: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 7);
const TIMEOUT: Duration = Duration::from_secs(3);

fn request() -> ProbeRequest {
    ProbeRequest::new(RecordType::A, "example.com")
}

#[tokio::test]
async fn test_dot_exchange_reuses_pooled_session() {
    let cert = TestCert::localhost();
    let (addr, accepted) = spawn_dot(&cert, fixed_a(ANSWER_IP, 300)).await;
    let server = Server::new("dot", "127.0.0.1:53".parse().unwrap())
        .with_protocols([Protocol::Dot])
        .with_dot(addr, "localhost");
    let transport =
        DotTransport::with_tls_config(Arc::new(cert.client_config()), DEFAULT_POOL_SIZE);

    for _ in 0..3 {
        let outcome = transport.probe(&server, &request(), TIMEOUT).await;
        assert!(outcome.success, "DoT exchange failed: {:?}", outcome.error);
        assert_eq!(outcome.rcode, Some(ResponseCode::NoError));
        assert_eq!(outcome.answers.len(), 1);
        assert_eq!(outcome.answers[0].address, Some(IpAddr::V4(ANSWER_IP)));
    }

    // Sequential probes share one TLS session
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dot_untrusted_certificate_is_protocol_error() {
    let served = TestCert::localhost();
    let (addr, _) = spawn_dot(&served, fixed_a(ANSWER_IP, 300)).await;
    let server = Server::new("dot", "127.0.0.1:53".parse().unwrap())
        .with_protocols([Protocol::Dot])
        .with_dot(addr, "localhost");
    // Client trusts a different certificate
    let other = TestCert::localhost();
    let transport =
        DotTransport::with_tls_config(Arc::new(other.client_config()), DEFAULT_POOL_SIZE);

    let outcome = transport.probe(&server, &request(), TIMEOUT).await;
    assert!(!outcome.success);
    assert_eq!(outcome.failure, Some(dns_bench::FailureKind::ProtocolError));
}

#[tokio::test]
async fn test_doh_exchange_reuses_http2_connection() {
    let cert = TestCert::localhost();
    let (addr, accepted) = spawn_doh(&cert, fixed_a(ANSWER_IP, 300)).await;
    let server = Server::new("doh", "127.0.0.1:53".parse().unwrap())
        .with_protocols([Protocol::Doh])
        .with_doh(format!("https://localhost:{}/dns-query", addr.port()));
    let transport = DohTransport::with_tls_config(cert.client_config());

    for _ in 0..3 {
        let outcome = transport.probe(&server, &request(), TIMEOUT).await;
        assert!(outcome.success, "DoH exchange failed: {:?}", outcome.error);
        assert_eq!(outcome.rcode, Some(ResponseCode::NoError));
        assert_eq!(outcome.answers[0].address, Some(IpAddr::V4(ANSWER_IP)));
    }

    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

/// A DNS-level error over HTTPS is still a successful exchange
#[tokio::test]
async fn test_doh_passes_through_nxdomain() {
    let cert = TestCert::localhost();
    let (addr, _) = spawn_doh(&cert, rcode_only(ResponseCode::NXDomain)).await;
    let server = Server::new("doh", "127.0.0.1:53".parse().unwrap())
        .with_protocols([Protocol::Doh])
        .with_doh(format!("https://localhost:{}/dns-query", addr.port()));

    let outcome = DohTransport::with_tls_config(cert.client_config())
        .probe(&server, &request(), TIMEOUT)
        .await;
    assert!(outcome.success, "DoH exchange failed: {:?}", outcome.error);
    assert_eq!(outcome.rcode, Some(ResponseCode::NXDomain));
    assert!(outcome.answers.is_empty());
}
