//! Transport adapters
//!
//! One adapter per wire protocol, all implementing [`Transport`]:
//!
//! | Protocol | Adapter | Connection reuse |
//! |----------|---------|------------------|
//! | UDP | [`UdpTransport`] | none, socket per probe |
//! | TCP | [`TcpTransport`] | `deadpool` pool per server |
//! | `DoT` | [`DotTransport`] | `deadpool` pool per endpoint |
//! | `DoH` | [`DohTransport`] | hyper HTTP/2 client |
//!
//! Adapters are looked up by protocol through a [`TransportRegistry`].
//!
//! # Feature Flags
//!
//! - `dot`: DNS-over-TLS adapter
//! - `doh`: DNS-over-HTTPS adapter

mod framing;
mod registry;
mod tcp;
mod tls;
mod traits;
mod udp;

#[cfg(feature = "doh")]
mod doh;
#[cfg(feature = "dot")]
mod dot;

pub use registry::TransportRegistry;
pub use tcp::{TcpTransport, DEFAULT_POOL_SIZE};
pub use tls::client_config;
pub use traits::{
    validate_response, Answer, Outcome, ProbeRequest, Response, Transport, EDNS_MAX_PAYLOAD,
    MAX_TCP_MESSAGE_SIZE,
};
pub use udp::UdpTransport;

pub(crate) use traits::fqdn;

#[cfg(feature = "doh")]
pub use doh::DohTransport;
#[cfg(feature = "dot")]
pub use dot::DotTransport;
