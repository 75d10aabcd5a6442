//! Security analysis
//!
//! Runs per server under test, independently of the latency benchmark:
//!
//! - **DNSSEC** ([`dnssec`]): fetch the answer, DNSKEY and DS RRsets
//!   through the server and walk the chain of trust.
//! - **Hijack** ([`hijack`], [`consensus`]): compare the server's answer
//!   with a quorum majority of trusted references.
//! - **Cache** ([`cache`]): query twice and check that the TTL decays by
//!   the elapsed time.
//!
//! Trusted references are queried once per run. Any failure degrades only
//! the finding it affects.

pub mod cache;
pub mod consensus;
pub mod dnssec;
pub mod hijack;

mod analyzer;

pub use analyzer::{SecurityAnalyzer, SecurityFinding};
pub use cache::{CacheAnomaly, CacheBehavior};
pub use consensus::{tally, AnswerSet, Consensus, ConsensusPolicy};
pub use dnssec::{validate_chain, ChainMaterial, ChainVerifier, DnssecStatus, HickoryVerifier};
pub use hijack::{judge, Confidence, HijackVerdict};
