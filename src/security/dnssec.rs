//! DNSSEC chain-of-trust validation
//!
//! Validation is a walk over three RRsets fetched from the server under
//! test: the signed answer, the signer zone's DNSKEY RRset and its DS
//! RRset. Cryptographic checks are delegated to a [`ChainVerifier`]; the
//! default [`HickoryVerifier`] uses `hickory-proto`'s DNSSEC support.
//!
//! ```text
//!   answer RRset ──RRSIG──► DNSKEY (tag, algorithm)
//!                              │
//!   DNSKEY RRset ──RRSIG──► DNSKEY ◄──digest── DS
//! ```

use std::fmt;
use std::time::Duration;

use hickory_proto::rr::dnssec::rdata::{DNSSECRData, DNSKEY, DS, RRSIG};
use hickory_proto::rr::dnssec::Verifier;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use serde::Serialize;
use tracing::debug;

use crate::config::{Protocol, Server};
use crate::error::{FailureKind, ProbeError, ProbeResult};
use crate::transport::{fqdn, ProbeRequest, TransportRegistry};

// ============================================================================
// Status
// ============================================================================

/// Outcome of DNSSEC validation for one server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum DnssecStatus {
    /// The chain from DS to the answer verified
    Valid,
    /// Signatures present but the chain did not verify
    Invalid {
        /// What failed
        reason: String,
    },
    /// No signatures, or no DS anchoring the signer zone
    Unsigned,
    /// The chain could not be fetched
    Indeterminate {
        /// Why
        reason: String,
    },
}

impl DnssecStatus {
    /// Short status name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid { .. } => "invalid",
            Self::Unsigned => "unsigned",
            Self::Indeterminate { .. } => "indeterminate",
        }
    }

    /// Failure classification, if this status is a failure
    pub fn failure(&self) -> Option<FailureKind> {
        match self {
            Self::Invalid { .. } => Some(FailureKind::VerificationFailed),
            _ => None,
        }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DnssecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid { reason } | Self::Indeterminate { reason } => {
                write!(f, "{} ({reason})", self.as_str())
            }
            _ => f.write_str(self.as_str()),
        }
    }
}

// ============================================================================
// Verifier seam
// ============================================================================

/// Cryptographic primitives used by [`validate_chain`]
pub trait ChainVerifier: Send + Sync + fmt::Debug {
    /// Key tag of a DNSKEY, `None` if it cannot be computed
    fn key_tag(&self, key: &DNSKEY) -> Option<u16>;

    /// Verify `sig` over `rrset` owned by `owner` with `key`
    ///
    /// # Errors
    ///
    /// Returns a description of the verification failure.
    fn verify_rrset(
        &self,
        key: &DNSKEY,
        sig: &RRSIG,
        owner: &Name,
        rrset: &[Record],
    ) -> Result<(), String>;

    /// Whether `ds` is a digest of `key` owned by `owner`
    fn ds_matches(&self, ds: &DS, owner: &Name, key: &DNSKEY) -> bool;
}

/// [`ChainVerifier`] backed by `hickory-proto` (ring)
#[derive(Debug, Clone, Copy, Default)]
pub struct HickoryVerifier;

impl ChainVerifier for HickoryVerifier {
    fn key_tag(&self, key: &DNSKEY) -> Option<u16> {
        key.calculate_key_tag().ok()
    }

    fn verify_rrset(
        &self,
        key: &DNSKEY,
        sig: &RRSIG,
        owner: &Name,
        rrset: &[Record],
    ) -> Result<(), String> {
        let class = rrset
            .first()
            .map(Record::dns_class)
            .ok_or_else(|| "empty RRset".to_string())?;
        key.verify_rrsig(owner, class, sig, rrset)
            .map_err(|e| e.to_string())
    }

    fn ds_matches(&self, ds: &DS, owner: &Name, key: &DNSKEY) -> bool {
        ds.covers(owner, key).unwrap_or(false)
    }
}

// ============================================================================
// Chain material
// ============================================================================

/// Records needed to validate one answer
#[derive(Debug, Clone)]
pub struct ChainMaterial {
    /// Queried name
    pub name: Name,
    /// Queried type
    pub record_type: RecordType,
    /// Answer section of the DO query, RRSIGs included
    pub answer: Vec<Record>,
    /// Signer zone apex
    pub zone: Name,
    /// Answer section of the zone's DNSKEY query
    pub dnskeys: Vec<Record>,
    /// Answer section of the zone's DS query
    pub ds: Vec<Record>,
}

fn rrsig_of(record: &Record) -> Option<&RRSIG> {
    match record.data() {
        Some(RData::DNSSEC(DNSSECRData::RRSIG(sig))) => Some(sig),
        _ => None,
    }
}

fn dnskey_of(record: &Record) -> Option<&DNSKEY> {
    match record.data() {
        Some(RData::DNSSEC(DNSSECRData::DNSKEY(key))) => Some(key),
        _ => None,
    }
}

fn ds_of(record: &Record) -> Option<&DS> {
    match record.data() {
        Some(RData::DNSSEC(DNSSECRData::DS(ds))) => Some(ds),
        _ => None,
    }
}

/// Records of `record_type` owned by `owner`
fn rrset(records: &[Record], owner: &Name, record_type: RecordType) -> Vec<Record> {
    records
        .iter()
        .filter(|r| r.record_type() == record_type && r.name() == owner)
        .cloned()
        .collect()
}

/// RRSIGs owned by `owner` covering `record_type`
fn covering<'a>(records: &'a [Record], owner: &Name, record_type: RecordType) -> Vec<&'a RRSIG> {
    records
        .iter()
        .filter(|r| r.name() == owner)
        .filter_map(rrsig_of)
        .filter(|sig| sig.type_covered() == record_type)
        .collect()
}

/// Signer zone named by the first RRSIG covering the answer, if any
pub fn signer_zone(answer: &[Record], name: &Name, record_type: RecordType) -> Option<Name> {
    let owner_type = answer_type(answer, name, record_type);
    covering(answer, name, owner_type)
        .first()
        .map(|sig| sig.signer_name().clone())
}

/// Type of the answer RRset at `name`: the queried type, or CNAME when
/// the name is an alias
fn answer_type(answer: &[Record], name: &Name, record_type: RecordType) -> RecordType {
    let direct = answer
        .iter()
        .any(|r| r.record_type() == record_type && r.name() == name);
    let alias = answer
        .iter()
        .any(|r| r.record_type() == RecordType::CNAME && r.name() == name);
    if !direct && alias {
        RecordType::CNAME
    } else {
        record_type
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Walk the chain of trust for `material`
///
/// 1. no RRSIG covering the answer RRset: `Unsigned`
/// 2. every covering RRSIG must reference a DNSKEY by tag and algorithm
///    and verify: otherwise `Invalid`
/// 3. no DS for the signer zone: `Unsigned`
/// 4. the DNSKEY RRset must carry a verifying RRSIG from a key one of the
///    DS records digests: otherwise `Invalid`
///
/// Signature validity periods are not checked.
pub fn validate_chain(material: &ChainMaterial, verifier: &dyn ChainVerifier) -> DnssecStatus {
    let answer_type = answer_type(&material.answer, &material.name, material.record_type);
    let answer = rrset(&material.answer, &material.name, answer_type);
    let sigs = covering(&material.answer, &material.name, answer_type);

    if sigs.is_empty() {
        return DnssecStatus::Unsigned;
    }
    if answer.is_empty() {
        return DnssecStatus::invalid("RRSIG without a covered RRset");
    }

    let keys: Vec<(&DNSKEY, Option<u16>)> = material
        .dnskeys
        .iter()
        .filter(|r| r.name() == &material.zone)
        .filter_map(dnskey_of)
        .filter(|key| key.zone_key())
        .map(|key| (key, verifier.key_tag(key)))
        .collect();

    let find_key = |sig: &RRSIG| {
        keys.iter()
            .find(|(key, tag)| *tag == Some(sig.key_tag()) && key.algorithm() == sig.algorithm())
            .map(|(key, _)| *key)
    };

    for sig in &sigs {
        if sig.signer_name() != &material.zone {
            return DnssecStatus::invalid(format!(
                "answer signed by {} but chain fetched for {}",
                sig.signer_name(),
                material.zone
            ));
        }
        let Some(key) = find_key(sig) else {
            return DnssecStatus::invalid(format!(
                "no DNSKEY with tag {} for {answer_type} RRSIG",
                sig.key_tag()
            ));
        };
        if let Err(e) = verifier.verify_rrset(key, sig, &material.name, &answer) {
            return DnssecStatus::invalid(format!("{answer_type} RRSIG did not verify: {e}"));
        }
    }

    let ds: Vec<&DS> = material
        .ds
        .iter()
        .filter(|r| r.name() == &material.zone)
        .filter_map(ds_of)
        .collect();
    if ds.is_empty() {
        debug!(zone = %material.zone, "no DS for signer zone");
        return DnssecStatus::Unsigned;
    }

    let anchored: Vec<(&DNSKEY, u16)> = keys
        .iter()
        .filter_map(|(key, tag)| tag.map(|t| (*key, t)))
        .filter(|(key, tag)| {
            ds.iter().any(|d| {
                d.key_tag() == *tag
                    && d.algorithm() == key.algorithm()
                    && verifier.ds_matches(d, &material.zone, key)
            })
        })
        .collect();
    if anchored.is_empty() {
        return DnssecStatus::invalid("no DNSKEY matches a DS record");
    }

    let key_rrset = rrset(&material.dnskeys, &material.zone, RecordType::DNSKEY);
    let key_sigs = covering(&material.dnskeys, &material.zone, RecordType::DNSKEY);
    let anchored_sig = key_sigs.iter().any(|sig| {
        anchored.iter().any(|(key, tag)| {
            *tag == sig.key_tag()
                && key.algorithm() == sig.algorithm()
                && verifier
                    .verify_rrset(key, sig, &material.zone, &key_rrset)
                    .is_ok()
        })
    });

    if anchored_sig {
        DnssecStatus::Valid
    } else {
        DnssecStatus::invalid("DNSKEY RRset not signed by a DS-anchored key")
    }
}

// ============================================================================
// Fetching
// ============================================================================

/// Fetch the records needed to validate `domain`/`record_type` at `server`
///
/// Every query goes through the server under test with the DO bit set.
/// When the answer carries no covering RRSIG, the DNSKEY and DS queries are
/// skipped.
///
/// # Errors
///
/// Returns the first query failure. A response other than `NOERROR` or
/// `NXDOMAIN` counts as a failure: a validating resolver answers `SERVFAIL`
/// for a bogus chain.
pub async fn fetch_chain(
    registry: &TransportRegistry,
    server: &Server,
    protocol: Protocol,
    domain: &str,
    record_type: RecordType,
    timeout: Duration,
) -> ProbeResult<ChainMaterial> {
    let name = fqdn(domain)?;
    let request = ProbeRequest::new(record_type, domain).with_dnssec();
    let response = registry
        .query(server, protocol, &request, timeout)
        .await?
        .ensure_answered()?;
    let answer = response.message.answers().to_vec();

    let Some(zone) = signer_zone(&answer, &name, record_type) else {
        return Ok(ChainMaterial {
            zone: name.clone(),
            name,
            record_type,
            answer,
            dnskeys: Vec::new(),
            ds: Vec::new(),
        });
    };

    let zone_str = zone.to_ascii();
    let key_request = ProbeRequest::new(RecordType::DNSKEY, zone_str.clone()).with_dnssec();
    let ds_request = ProbeRequest::new(RecordType::DS, zone_str).with_dnssec();
    let (keys, ds) = tokio::join!(
        registry.query(server, protocol, &key_request, timeout),
        registry.query(server, protocol, &ds_request, timeout),
    );
    let keys = keys?.ensure_answered()?;
    let ds = ds?.ensure_answered()?;

    if keys.message.answers().is_empty() {
        return Err(ProbeError::protocol(format!("empty DNSKEY RRset for {zone}")));
    }

    Ok(ChainMaterial {
        name,
        record_type,
        answer,
        zone,
        dnskeys: keys.message.answers().to_vec(),
        ds: ds.message.answers().to_vec(),
    })
}

/// Fetch and validate, folding query failures into `Indeterminate`
pub async fn check_dnssec(
    registry: &TransportRegistry,
    server: &Server,
    protocol: Protocol,
    domain: &str,
    record_type: RecordType,
    timeout: Duration,
    verifier: &dyn ChainVerifier,
) -> DnssecStatus {
    match fetch_chain(registry, server, protocol, domain, record_type, timeout).await {
        Ok(material) => validate_chain(&material, verifier),
        Err(e) => {
            debug!(server = %server.name, error = %e, "DNSSEC chain fetch failed");
            DnssecStatus::Indeterminate {
                reason: format!("{}: {e}", e.kind()),
            }
        }
    }
}
