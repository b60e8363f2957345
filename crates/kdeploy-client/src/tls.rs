//! Mutual-TLS client configuration.
//!
//! The control plane authenticates kdeploy by client certificate and is
//! itself verified against a private CA bundle. All three inputs are PEM.

use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};

use crate::error::{ClientError, ClientResult};

/// Build a client config from PEM files on disk.
pub fn client_config(cert: &Path, key: &Path, ca_cert: &Path) -> ClientResult<Arc<ClientConfig>> {
    let cert_pem = read_pem(cert, "client certificate")?;
    let key_pem = read_pem(key, "client key")?;
    let ca_pem = read_pem(ca_cert, "CA bundle")?;
    client_config_from_pem(&cert_pem, &key_pem, &ca_pem)
}

/// Build a client config from in-memory PEM material.
pub fn client_config_from_pem(
    cert_pem: &[u8],
    key_pem: &[u8],
    ca_pem: &[u8],
) -> ClientResult<Arc<ClientConfig>> {
    let mut roots = RootCertStore::empty();
    for ca in parse_certs(ca_pem, "CA bundle")? {
        roots
            .add(ca)
            .map_err(|e| ClientError::Tls(format!("rejected CA certificate: {e}")))?;
    }

    let chain = parse_certs(cert_pem, "client certificate")?;
    let key = parse_key(key_pem)?;

    let config = ClientConfig::builder_with_provider(rustls::crypto::ring::default_provider().into())
        .with_safe_default_protocol_versions()
        .map_err(|e| ClientError::Tls(format!("tls protocol version error: {e}")))?
        .with_root_certificates(roots)
        .with_client_auth_cert(chain, key)
        .map_err(|e| ClientError::Tls(format!("client certificate rejected: {e}")))?;

    Ok(Arc::new(config))
}

fn read_pem(path: &Path, what: &str) -> ClientResult<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| ClientError::Tls(format!("cannot read {what} {}: {e}", path.display())))
}

fn parse_certs(pem: &[u8], what: &str) -> ClientResult<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ClientError::Tls(format!("malformed {what}: {e}")))?;
    if certs.is_empty() {
        return Err(ClientError::Tls(format!("no certificates in {what}")));
    }
    Ok(certs)
}

fn parse_key(pem: &[u8]) -> ClientResult<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| ClientError::Tls(format!("malformed client key: {e}")))?
        .ok_or_else(|| ClientError::Tls("no private key in client key file".into()))
}
