//! Concurrency cap under load

use std::sync::Arc;
use std::time::Duration;

use dns_bench::config::{BenchConfig, Protocol, SecurityConfig};
use dns_bench::engine::Benchmark;
use dns_bench::transport::TransportRegistry;
use tokio_util::sync::CancellationToken;

use super::support::{server, ScriptedTransport};

async fn run_with_limit(limit: usize) {
    let transport = Arc::new(ScriptedTransport::new(Protocol::Udp, Duration::from_millis(3)));
    let registry = Arc::new(TransportRegistry::new().with(transport.clone()));

    let config = BenchConfig::new(vec![server("a"), server("b"), server("c")])
        .with_protocols([Protocol::Udp])
        .with_domains(["example.com", "example.org"])
        .with_queries_per_test(20)
        .with_concurrency_limit(limit)
        .with_security(SecurityConfig::disabled());

    let report = Benchmark::with_registry(config, registry)
        .unwrap()
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.outcomes_observed, 120);
    assert_eq!(report.stats.total_sent(), 120);
    assert!(report.peak_in_flight <= limit, "gate peak {} > {limit}", report.peak_in_flight);
    assert!(transport.peak() <= limit, "transport peak {} > {limit}", transport.peak());
    assert!(transport.peak() >= 1);
}

#[tokio::test]
async fn test_limit_one() {
    run_with_limit(1).await;
}

#[tokio::test]
async fn test_limit_five() {
    run_with_limit(5).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_limit_fifty() {
    run_with_limit(50).await;
}

/// Every job yields exactly one outcome, none duplicated
#[tokio::test]
async fn test_outcome_count_matches_jobs() {
    let transport = Arc::new(ScriptedTransport::new(Protocol::Udp, Duration::ZERO));
    let registry = Arc::new(TransportRegistry::new().with(transport.clone()));
    let config = BenchConfig::new(vec![server("a"), server("b")])
        .with_protocols([Protocol::Udp])
        .with_queries_per_test(37)
        .with_concurrency_limit(8)
        .with_security(SecurityConfig::disabled());

    let report = Benchmark::with_registry(config, registry)
        .unwrap()
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcomes_observed, 74);
    assert_eq!(transport.completed(), 74);
    for name in ["a", "b"] {
        assert_eq!(report.stats.find(name, Protocol::Udp).unwrap().sent, 37);
    }
}
