//! Client TLS configuration shared by `DoT` and `DoH`
//!
//! The ring provider is selected explicitly instead of relying on a
//! process-wide default, so building a transport never depends on global
//! state.

use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};

use crate::error::{ConfigError, ProbeError, ProbeResult};

/// Build a client config trusting the Mozilla root set
///
/// # Errors
///
/// Returns `ConfigError::TransportInit` if the provider rejects the default
/// protocol versions.
pub fn client_config() -> Result<ClientConfig, ConfigError> {
    let root_store = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| ConfigError::TransportInit(format!("TLS configuration: {e}")))?
    .with_root_certificates(root_store)
    .with_no_client_auth();

    Ok(config)
}

/// Parse a TLS server name for SNI and certificate verification
#[cfg_attr(not(feature = "dot"), allow(dead_code))]
pub(crate) fn server_name(name: &str) -> ProbeResult<ServerName<'static>> {
    ServerName::try_from(name.to_string())
        .map_err(|e| ProbeError::protocol(format!("invalid TLS server name '{name}': {e}")))
}
