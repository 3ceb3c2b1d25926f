//! rustls configuration and time-bounded handshakes.
//!
//! All configs are built with the `ring` crypto provider passed explicitly,
//! so nothing depends on a process-wide default provider being installed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{self, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, ServerConfig, SignatureScheme};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::warn;

use super::credentials::{load_certificates, load_private_key, load_trust_anchors};
use super::{CredentialError, HandshakeError};

/// Server side of an established TLS session.
pub type ServerSession = tokio_rustls::server::TlsStream<TcpStream>;

/// Client side of an established TLS session.
pub type ClientSession = tokio_rustls::client::TlsStream<TcpStream>;

/// How the client decides whether to trust the server certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerTrust {
    /// Verify against the roots in this PEM file.
    Anchors(PathBuf),
    /// Accept any certificate. Signatures are still checked, identity is not.
    AcceptAny,
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(crypto::ring::default_provider())
}

/// Builds a TLS acceptor from the PEM certificate chain and private key files.
///
/// # Errors
///
/// Returns a [`CredentialError`] if either file is missing or malformed, or if
/// rustls rejects the key/certificate pair.
pub fn build_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, CredentialError> {
    let certs = load_certificates(cert_path)?;
    let key = load_private_key(key_path)?;

    let config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Builds a TLS connector for the interactive client.
///
/// # Errors
///
/// Returns a [`CredentialError`] if the trust-anchor file cannot be loaded.
pub fn build_connector(trust: &ServerTrust) -> Result<TlsConnector, CredentialError> {
    let provider = provider();
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()?;

    let config = match trust {
        ServerTrust::Anchors(path) => builder
            .with_root_certificates(load_trust_anchors(path)?)
            .with_no_client_auth(),
        ServerTrust::AcceptAny => {
            warn!("server certificate verification is disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(provider)))
                .with_no_client_auth()
        }
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Parses the name the client presents for SNI and certificate matching.
///
/// # Errors
///
/// [`CredentialError::InvalidServerName`] if `name` is neither a DNS name nor
/// an IP address.
pub fn server_name(name: &str) -> Result<ServerName<'static>, CredentialError> {
    ServerName::try_from(name.to_string())
        .map_err(|_| CredentialError::InvalidServerName(name.to_string()))
}

/// Runs the server side of the handshake on `stream`, giving up after `limit`.
pub async fn handshake_as_server(
    acceptor: &TlsAcceptor,
    stream: TcpStream,
    limit: Duration,
) -> Result<ServerSession, HandshakeError> {
    match timeout(limit, acceptor.accept(stream)).await {
        Ok(Ok(session)) => Ok(session),
        Ok(Err(e)) => Err(HandshakeError::Tls(e)),
        Err(_) => Err(HandshakeError::TimedOut(limit)),
    }
}

/// Runs the client side of the handshake on `stream`, giving up after `limit`.
pub async fn handshake_as_client(
    connector: &TlsConnector,
    name: ServerName<'static>,
    stream: TcpStream,
    limit: Duration,
) -> Result<ClientSession, HandshakeError> {
    match timeout(limit, connector.connect(name, stream)).await {
        Ok(Ok(session)) => Ok(session),
        Ok(Err(e)) => Err(HandshakeError::Tls(e)),
        Err(_) => Err(HandshakeError::TimedOut(limit)),
    }
}

/// Verifier behind [`ServerTrust::AcceptAny`].
#[derive(Debug)]
struct AcceptAnyServerCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join(name)
    }

    #[test]
    fn test_build_acceptor_from_fixtures_succeeds() {
        assert!(build_acceptor(&fixture("server-cert.pem"), &fixture("server-key.pem")).is_ok());
    }

    #[test]
    fn test_build_acceptor_with_swapped_files_fails() {
        let result = build_acceptor(&fixture("server-key.pem"), &fixture("server-cert.pem"));
        assert!(matches!(result, Err(CredentialError::NoCertificate(_))));
    }

    #[test]
    fn test_build_acceptor_with_missing_key_fails() {
        let result = build_acceptor(&fixture("server-cert.pem"), &fixture("missing-key.pem"));
        assert!(matches!(result, Err(CredentialError::Io { kind: "private key", .. })));
    }

    #[test]
    fn test_build_connector_with_anchors_succeeds() {
        let trust = ServerTrust::Anchors(fixture("ca-cert.pem"));
        assert!(build_connector(&trust).is_ok());
    }

    #[test]
    fn test_build_connector_accept_any_succeeds() {
        assert!(build_connector(&ServerTrust::AcceptAny).is_ok());
    }

    #[test]
    fn test_server_name_accepts_dns_and_ip() {
        assert!(server_name("localhost").is_ok());
        assert!(server_name("127.0.0.1").is_ok());
    }

    #[test]
    fn test_server_name_rejects_garbage() {
        let err = server_name("not a host!").unwrap_err();
        assert!(matches!(err, CredentialError::InvalidServerName(_)));
    }
}
