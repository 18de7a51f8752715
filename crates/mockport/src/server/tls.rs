//! TLS acceptor construction for mock listeners.

use super::types::ServerError;
use crate::mock::TlsConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::io::BufReader;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tracing::debug;

type CertPair = (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>);

/// Build a TLS acceptor from the configured PEM files, or from a freshly generated
/// self-signed pair when either path is missing.
///
/// Explicit files that cannot be read or parsed are an error, never a fallback.
pub fn build_tls_acceptor(config: &TlsConfig) -> Result<TlsAcceptor, ServerError> {
    let (certs, key) = match config.pem_paths() {
        Some((cert_path, key_path)) => load_pem_pair(cert_path, key_path)?,
        None => {
            debug!("No certificate configured, generating a self-signed pair");
            self_signed_pair()?
        }
    };

    let mut server_config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| ServerError::Tls(format!("unsupported protocol versions: {e}")))?
    .with_no_client_auth()
    .with_single_cert(certs, key)
    .map_err(|e| ServerError::Tls(format!("failed to build TLS configuration: {e}")))?;
    server_config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

fn load_pem_pair(cert_path: &str, key_path: &str) -> Result<CertPair, ServerError> {
    let cert_file = std::fs::File::open(cert_path).map_err(|e| {
        ServerError::Tls(format!("failed to open certificate file '{cert_path}': {e}"))
    })?;
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut BufReader::new(cert_file))
            .collect::<Result<_, _>>()
            .map_err(|e| ServerError::Tls(format!("failed to parse certificate file: {e}")))?;
    if certs.is_empty() {
        return Err(ServerError::Tls(format!(
            "no certificates found in {cert_path}"
        )));
    }

    let key_file = std::fs::File::open(key_path).map_err(|e| {
        ServerError::Tls(format!("failed to open private key file '{key_path}': {e}"))
    })?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .map_err(|e| ServerError::Tls(format!("failed to parse private key file: {e}")))?
        .ok_or_else(|| ServerError::Tls(format!("no private key found in {key_path}")))?;

    Ok((certs, key))
}

fn self_signed_pair() -> Result<CertPair, ServerError> {
    let certified =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string(), "127.0.0.1".to_string()])
            .map_err(|e| ServerError::Tls(format!("failed to generate certificate: {e}")))?;

    let cert = certified.cert.der().clone();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        certified.key_pair.serialize_der(),
    ));
    Ok((vec![cert], key))
}
