//! Security analysis against in-process resolvers

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dns_bench::config::{BenchConfig, Protocol, SecurityConfig, Server};
use dns_bench::engine::Benchmark;
use dns_bench::error::FailureKind;
use dns_bench::security::{
    AnswerSet, CacheAnomaly, Confidence, DnssecStatus, HijackVerdict, SecurityAnalyzer,
};
use dns_bench::transport::{TransportRegistry, UdpTransport};
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::dnssec::rdata::{DNSSECRData, DNSKEY, DS, RRSIG};
use hickory_proto::rr::dnssec::{Algorithm, DigestType};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use tokio_util::sync::CancellationToken;

use super::support::{fixed_a, rcode_only, reply_to, spawn_resolver, Answerer};

const TRUE_IP: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);
const FORGED_IP: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 66);

fn udp_registry() -> Arc<TransportRegistry> {
    Arc::new(TransportRegistry::new().with(Arc::new(UdpTransport::new())))
}

fn fast_security() -> SecurityConfig {
    SecurityConfig {
        cache_probe_delay_ms: 100,
        ..SecurityConfig::default()
    }
}

/// Three trusted references agree; one tested server forges the answer
#[tokio::test]
async fn test_hijack_detected_against_reference_majority() {
    let mut servers = Vec::new();
    for i in 0..3 {
        let addr = spawn_resolver(fixed_a(TRUE_IP, 300)).await;
        servers.push(Server::new(format!("ref-{i}"), addr).trusted());
    }
    let liar = spawn_resolver(fixed_a(FORGED_IP, 300)).await;
    let honest = spawn_resolver(fixed_a(TRUE_IP, 300)).await;
    servers.push(Server::new("liar", liar));
    servers.push(Server::new("honest", honest));

    let config = BenchConfig::new(servers)
        .with_queries_per_test(1)
        .with_timeout_secs(1.0)
        .with_security(fast_security());

    let report = Benchmark::with_registry(config, udp_registry())
        .unwrap()
        .run(CancellationToken::new())
        .await
        .unwrap();

    // References get no finding of their own
    assert_eq!(report.security.len(), 2);
    assert!(report.finding("ref-0").is_none());

    let liar = report.finding("liar").unwrap();
    assert_eq!(
        liar.hijack,
        HijackVerdict::Suspected {
            evidence: [FORGED_IP.to_string()].into_iter().collect::<AnswerSet>(),
            expected: [TRUE_IP.to_string()].into_iter().collect::<AnswerSet>(),
            confidence: Confidence::High,
        }
    );

    let honest = report.finding("honest").unwrap();
    assert_eq!(honest.hijack, HijackVerdict::None);

    // Plain responders sign nothing
    assert_eq!(honest.dnssec, DnssecStatus::Unsigned);
    // Fixed TTL over a short pause is within tolerance
    assert_eq!(honest.cache.cache_hit, Some(true));

    let row = report
        .rows()
        .into_iter()
        .find(|r| r.server == "liar")
        .unwrap();
    assert_eq!(row.hijack, Some("suspected"));
}

/// Serves `secure.test.` with signatures that cannot verify
fn bogus_signed_zone() -> Answerer {
    let zone = Name::from_ascii("secure.test.").unwrap();
    let alg = Algorithm::ECDSAP256SHA256;
    let tag = 4242;

    Arc::new(move |query: &Message| {
        let mut response = reply_to(query);
        let Some(q) = query.queries().first() else {
            return response;
        };
        let sig = |covered: RecordType| {
            let rrsig = RRSIG::new(
                covered,
                alg,
                2,
                300,
                u32::MAX,
                0,
                tag,
                zone.clone(),
                vec![0x5a; 64],
            );
            Record::from_rdata(zone.clone(), 300, RData::DNSSEC(DNSSECRData::RRSIG(rrsig)))
        };

        match q.query_type() {
            RecordType::A => {
                response.add_answer(Record::from_rdata(zone.clone(), 300, RData::A(A(TRUE_IP))));
                response.add_answer(sig(RecordType::A));
            }
            RecordType::DNSKEY => {
                let key = DNSKEY::new(true, true, false, alg, vec![0x11; 64]);
                response.add_answer(Record::from_rdata(
                    zone.clone(),
                    300,
                    RData::DNSSEC(DNSSECRData::DNSKEY(key)),
                ));
                response.add_answer(sig(RecordType::DNSKEY));
            }
            RecordType::DS => {
                let ds = DS::new(tag, alg, DigestType::SHA256, vec![0xab; 32]);
                response.add_answer(Record::from_rdata(
                    zone.clone(),
                    300,
                    RData::DNSSEC(DNSSECRData::DS(ds)),
                ));
            }
            _ => {}
        }
        response
    })
}

#[tokio::test]
async fn test_invalid_signature_chain_is_invalid() {
    let addr = spawn_resolver(bogus_signed_zone()).await;
    let servers = vec![Server::new("signed", addr)];

    let config = SecurityConfig {
        dnssec_domain: "secure.test".into(),
        cache_domain: "secure.test".into(),
        hijack_domain: "secure.test".into(),
        ..fast_security()
    };
    let findings = SecurityAnalyzer::new(udp_registry(), config, Duration::from_secs(1))
        .analyze(&servers, &CancellationToken::new())
        .await;

    assert_eq!(findings.len(), 1);
    let dnssec = &findings[0].dnssec;
    assert!(
        matches!(dnssec, DnssecStatus::Invalid { .. }),
        "expected invalid, got {dnssec}"
    );
    // No references configured
    assert_eq!(findings[0].hijack.as_str(), "indeterminate");
}

/// TTL grows between the two cache probes
#[tokio::test]
async fn test_increasing_ttl_flagged_as_anomaly() {
    let counter = Arc::new(AtomicU32::new(0));
    let answerer: Answerer = Arc::new(move |query: &Message| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        let mut response = reply_to(query);
        if let Some(q) = query.queries().first() {
            response.add_answer(Record::from_rdata(
                q.name().clone(),
                100 + 100 * n,
                RData::A(A(TRUE_IP)),
            ));
        }
        response
    });
    let addr = spawn_resolver(answerer).await;

    let config = SecurityConfig {
        cache_domain: "ttl.test".into(),
        ..fast_security()
    };
    let servers = vec![Server::new("rewriter", addr)];
    let findings = SecurityAnalyzer::new(udp_registry(), config, Duration::from_secs(1))
        .analyze(&servers, &CancellationToken::new())
        .await;

    let cache = &findings[0].cache;
    assert_eq!(cache.anomaly, Some(CacheAnomaly::TtlIncreased));
    assert_eq!(cache.cache_hit, Some(false));
    // An anomaly is not a security failure
    assert_eq!(findings[0].dnssec, DnssecStatus::Unsigned);
}

#[tokio::test]
async fn test_unreachable_server_degrades_findings_only() {
    let reference = spawn_resolver(fixed_a(TRUE_IP, 300)).await;
    let servers = vec![
        Server::new("ref", reference).trusted(),
        // Reserved documentation address, never answers
        Server::new("silent", "192.0.2.250:53".parse().unwrap())
            .with_protocols([Protocol::Udp]),
    ];

    let findings = SecurityAnalyzer::new(udp_registry(), fast_security(), Duration::from_millis(200))
        .analyze(&servers, &CancellationToken::new())
        .await;

    assert_eq!(findings.len(), 1);
    let finding = &findings[0];
    assert_eq!(finding.dnssec.as_str(), "indeterminate");
    assert!(matches!(finding.hijack, HijackVerdict::Indeterminate { .. }));
    assert!(finding.cache.is_unknown());
}

/// A server that refuses to resolve is not a hijacker
#[tokio::test]
async fn test_refused_answer_is_indeterminate_not_suspected() {
    let mut servers = Vec::new();
    for i in 0..3 {
        let addr = spawn_resolver(fixed_a(TRUE_IP, 300)).await;
        servers.push(Server::new(format!("ref-{i}"), addr).trusted());
    }
    let refuser = spawn_resolver(rcode_only(ResponseCode::Refused)).await;
    servers.push(Server::new("refuser", refuser));

    let findings = SecurityAnalyzer::new(udp_registry(), fast_security(), Duration::from_secs(1))
        .analyze(&servers, &CancellationToken::new())
        .await;

    assert_eq!(findings.len(), 1);
    let finding = &findings[0];
    assert_eq!(
        finding.hijack,
        HijackVerdict::Indeterminate {
            reason: FailureKind::ProtocolError
        }
    );
    assert_eq!(finding.dnssec.as_str(), "indeterminate");
    assert!(finding.cache.is_unknown());
}

/// A failing reference casts no vote
#[tokio::test]
async fn test_servfail_reference_is_not_counted() {
    let mut servers = Vec::new();
    for i in 0..2 {
        let addr = spawn_resolver(fixed_a(TRUE_IP, 300)).await;
        servers.push(Server::new(format!("ref-{i}"), addr).trusted());
    }
    let broken = spawn_resolver(rcode_only(ResponseCode::ServFail)).await;
    servers.push(Server::new("ref-broken", broken).trusted());
    let honest = spawn_resolver(fixed_a(TRUE_IP, 300)).await;
    servers.push(Server::new("honest", honest));

    let findings = SecurityAnalyzer::new(udp_registry(), fast_security(), Duration::from_secs(1))
        .analyze(&servers, &CancellationToken::new())
        .await;

    // Two agreeing references out of two responding is still a majority
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].hijack, HijackVerdict::None);
}

/// SERVFAIL on the signed domain is what a validating resolver returns for
/// a bogus chain, so the status is unknown rather than unsigned
#[tokio::test]
async fn test_servfail_on_signed_domain_is_indeterminate() {
    let addr = spawn_resolver(rcode_only(ResponseCode::ServFail)).await;
    let servers = vec![Server::new("validating", addr)];

    let findings = SecurityAnalyzer::new(udp_registry(), fast_security(), Duration::from_secs(1))
        .analyze(&servers, &CancellationToken::new())
        .await;

    let dnssec = &findings[0].dnssec;
    assert!(
        matches!(dnssec, DnssecStatus::Indeterminate { .. }),
        "expected indeterminate, got {dnssec}"
    );
    assert_ne!(*dnssec, DnssecStatus::Unsigned);
}
