//! End-to-end benchmark runs against in-process resolvers

use std::net::Ipv4Addr;
use std::sync::Arc;

use dns_bench::config::{BenchConfig, Protocol, SecurityConfig, Server};
use dns_bench::engine::Benchmark;
use dns_bench::error::FailureKind;
use dns_bench::transport::{TcpTransport, TransportRegistry, UdpTransport};
use tokio_util::sync::CancellationToken;

use super::support::{fixed_a, spawn_resolver, spawn_tcp_only_resolver};

fn plain_registry() -> Arc<TransportRegistry> {
    Arc::new(
        TransportRegistry::new()
            .with(Arc::new(UdpTransport::new()))
            .with(Arc::new(TcpTransport::new(4))),
    )
}

/// Two servers over UDP and TCP; the second drops every UDP query
#[tokio::test]
async fn test_e2e_udp_blackhole_isolated_to_one_key() {
    let healthy = spawn_resolver(fixed_a(Ipv4Addr::new(192, 0, 2, 1), 300)).await;
    let udp_dead = spawn_tcp_only_resolver(fixed_a(Ipv4Addr::new(192, 0, 2, 1), 300)).await;

    let config = BenchConfig::new(vec![
        Server::new("one", healthy),
        Server::new("two", udp_dead),
    ])
    .with_protocols([Protocol::Udp, Protocol::Tcp])
    .with_domains(["example.com"])
    .with_queries_per_test(10)
    .with_timeout_secs(0.3)
    .with_security(SecurityConfig::disabled());

    let report = Benchmark::with_registry(config, plain_registry())
        .unwrap()
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.jobs_planned, 40);
    assert_eq!(report.outcomes_observed, 40);
    assert_eq!(report.stats.len(), 4);

    for protocol in [Protocol::Udp, Protocol::Tcp] {
        let row = report.stats.find("one", protocol).unwrap();
        assert_eq!(row.sent, 10);
        assert_eq!(row.reliability_pct, Some(100.0), "one/{protocol}");
        assert!(row.mean_ms().is_some());
    }

    let dead = report.stats.find("two", Protocol::Udp).unwrap();
    assert_eq!(dead.sent, 10);
    assert_eq!(dead.reliability_pct, Some(0.0));
    assert_eq!(dead.loss_pct, Some(100.0));
    assert!(dead.latency.is_none());
    assert_eq!(dead.failures.get(&FailureKind::Timeout), Some(&10));

    let tcp = report.stats.find("two", Protocol::Tcp).unwrap();
    assert_eq!(tcp.reliability_pct, Some(100.0));
    assert_eq!(tcp.loss_pct, Some(0.0));

    // Full-loss entry ranks last
    let ranked = report.rankings(Protocol::Udp);
    assert_eq!(ranked.last().unwrap().server, "two");

    let rows = report.rows();
    assert_eq!(rows.len(), 4);
    for row in &rows {
        if let (Some(r), Some(l)) = (row.reliability_pct, row.loss_pct) {
            assert_eq!(r + l, 100.0);
        }
    }
}

#[tokio::test]
async fn test_e2e_uncached_queries_split_latency() {
    let addr = spawn_resolver(fixed_a(Ipv4Addr::new(192, 0, 2, 7), 60)).await;
    let config = BenchConfig::new(vec![Server::new("local", addr)])
        .with_queries_per_test(4)
        .with_uncached_queries(true)
        .with_timeout_secs(1.0)
        .with_security(SecurityConfig::disabled());

    let report = Benchmark::with_registry(config, plain_registry())
        .unwrap()
        .run(CancellationToken::new())
        .await
        .unwrap();

    let row = report.stats.find("local", Protocol::Udp).unwrap();
    assert_eq!(row.sent, 8);
    assert!(row.cached_mean_ms.is_some());
    assert!(row.uncached_mean_ms.is_some());
    assert_eq!(row.rcode_count("noerror"), 8);
}

#[tokio::test]
async fn test_e2e_unreachable_server_reported() {
    // Nothing listens on the discard port
    let config = BenchConfig::new(vec![Server::new("nobody", "127.0.0.1:9".parse().unwrap())])
        .with_protocols([Protocol::Tcp])
        .with_queries_per_test(3)
        .with_timeout_secs(1.0)
        .with_security(SecurityConfig::disabled());

    let report = Benchmark::with_registry(config, plain_registry())
        .unwrap()
        .run(CancellationToken::new())
        .await
        .unwrap();

    let row = report.stats.find("nobody", Protocol::Tcp).unwrap();
    assert_eq!(row.sent, 3);
    assert!(row.is_total_loss());
    assert_eq!(row.failures.get(&FailureKind::ConnectionRefused), Some(&3));
}
