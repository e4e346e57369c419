//! TLS client configuration.
//!
//! By default the root store is the Mozilla set bundled by `webpki-roots`.
//! A PEM file can be supplied instead to pin the trust anchors, e.g. for a
//! corporate proxy or a staging endpoint with a private CA.

use std::path::Path;
use std::sync::Arc;

use rustls::{ClientConfig, RootCertStore};
use tracing::info;

use crate::Result;
use crate::error::DeckError;

/// Builds a [`ClientConfig`] trusting either the bundled web roots or only
/// the certificates in `ca_file`.
///
/// # Errors
///
/// Returns [`DeckError::Tls`] if `ca_file` cannot be read or contains no
/// usable certificate.
pub fn build_tls_config(ca_file: Option<&Path>) -> Result<ClientConfig> {
    let root_store = match ca_file {
        Some(path) => pinned_roots(path)?,
        None => RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    };

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| DeckError::Tls(format!("unsupported protocol versions: {e}")))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(config)
}

fn pinned_roots(path: &Path) -> Result<RootCertStore> {
    let pem = std::fs::read(path)
        .map_err(|e| DeckError::Tls(format!("failed to read {}: {e}", path.display())))?;

    let certs: Vec<_> = rustls_pemfile::certs(&mut &pem[..])
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| DeckError::Tls(format!("failed to parse CA PEM: {e}")))?;

    let mut root_store = RootCertStore::empty();
    let (added, ignored) = root_store.add_parsable_certificates(certs);
    if added == 0 {
        return Err(DeckError::Tls(format!(
            "no usable CA certificate in {}",
            path.display()
        )));
    }

    info!(added, ignored, path = %path.display(), "Pinned CA certificates");
    Ok(root_store)
}
