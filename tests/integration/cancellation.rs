//! Cancellation mid-run

use std::sync::Arc;
use std::time::Duration;

use dns_bench::config::{BenchConfig, Protocol, SecurityConfig};
use dns_bench::engine::Benchmark;
use dns_bench::scheduler::{JobPlan, Scheduler};
use dns_bench::transport::TransportRegistry;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::support::{server, ScriptedTransport};

/// 100 queued jobs, one at a time, cancelled when the 10th completes
#[tokio::test]
async fn test_cancel_after_ten_of_hundred() {
    let cancel = CancellationToken::new();
    let transport = Arc::new(
        ScriptedTransport::new(Protocol::Udp, Duration::from_millis(2)).cancel_after(10, cancel.clone()),
    );
    let registry = Arc::new(TransportRegistry::new().with(transport.clone()));

    let config = BenchConfig::new(vec![server("a")])
        .with_protocols([Protocol::Udp])
        .with_queries_per_test(100)
        .with_concurrency_limit(1)
        .with_security(SecurityConfig::disabled());

    let report = Benchmark::with_registry(config, registry)
        .unwrap()
        .run(cancel)
        .await
        .unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.jobs_planned, 100);
    assert_eq!(report.outcomes_observed, 10);
    assert_eq!(transport.completed(), 10);

    let row = report.stats.find("a", Protocol::Udp).unwrap();
    assert_eq!(row.sent, 10);
    assert_eq!(row.succeeded, 10);
    assert_eq!(row.reliability_pct, Some(100.0));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"]["state"], "incomplete");
}

/// In-flight jobs still report after cancellation
#[tokio::test]
async fn test_in_flight_jobs_finish_after_cancel() {
    let cancel = CancellationToken::new();
    let transport = Arc::new(ScriptedTransport::new(Protocol::Udp, Duration::from_millis(50)));
    let registry = Arc::new(TransportRegistry::new().with(transport.clone()));
    let scheduler = Scheduler::new(registry, Duration::from_secs(1));

    let plan = JobPlan::expand(
        &BenchConfig::new(vec![server("a")])
            .with_protocols([Protocol::Udp])
            .with_queries_per_test(20),
    );
    let mut stream = scheduler.run(plan.jobs, 4, cancel.clone());

    // Let the first batch get admitted, then stop admission
    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();

    let mut outcomes = Vec::new();
    while let Some(outcome) = stream.next().await {
        outcomes.push(outcome);
    }

    assert_eq!(outcomes.len(), 4);
    assert!(outcomes.iter().all(|o| o.outcome.success));
    assert_eq!(transport.completed(), 4);
}

/// Dropping the stream cancels the run
#[tokio::test]
async fn test_dropping_stream_stops_admission() {
    let transport = Arc::new(ScriptedTransport::new(Protocol::Udp, Duration::from_millis(20)));
    let registry = Arc::new(TransportRegistry::new().with(transport.clone()));
    let scheduler = Scheduler::new(registry, Duration::from_secs(1));

    let plan = JobPlan::expand(
        &BenchConfig::new(vec![server("a")])
            .with_protocols([Protocol::Udp])
            .with_queries_per_test(50),
    );
    let stream = scheduler.run(plan.jobs, 2, CancellationToken::new());
    tokio::time::sleep(Duration::from_millis(5)).await;
    drop(stream);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(transport.completed() <= 4, "completed {}", transport.completed());
}
