//! Integration tests for dns-bench
//!
//! Every test runs against resolvers spawned inside the test process, so
//! no network access is needed.
//!
//! # Test Organization
//!
//! - `support`: in-process UDP/TCP/TLS/HTTPS responders and a scripted transport
//! - `e2e`: full benchmark runs over real sockets
//! - `cancellation`: stopping a run mid-flight
//! - `concurrency`: the in-flight cap under load
//! - `security`: DNSSEC, hijack and cache checks
//! - `encrypted`: DoT and DoH against in-process TLS responders
//!
//! # Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test --test integration_tests
//!
//! # Run specific test module
//! cargo test --test integration_tests security
//! ```

pub mod support;

pub mod cancellation;
pub mod concurrency;
pub mod e2e;
#[cfg(all(feature = "dot", feature = "doh"))]
pub mod encrypted;
pub mod security;
