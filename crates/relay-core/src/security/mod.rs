//! TLS credentials and session setup.
//!
//! The handshake itself belongs to rustls; this module only wires it up:
//!
//! - [`credentials`] – loading the PEM certificate chain, private key and
//!   client trust anchors.
//! - [`tls`] – building rustls configs and running time-bounded handshakes
//!   on a raw `TcpStream`.

pub mod credentials;
pub mod tls;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub use credentials::{load_certificates, load_private_key, load_trust_anchors};
pub use tls::{
    build_acceptor, build_connector, handshake_as_client, handshake_as_server, server_name,
    ClientSession, ServerSession, ServerTrust,
};

/// Credential material could not be loaded or was rejected.
///
/// Always fatal at startup.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to read {kind} file {path}: {source}")]
    Io {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no certificate found in {0}")]
    NoCertificate(PathBuf),
    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),
    #[error("TLS configuration rejected: {0}")]
    Rejected(#[from] rustls::Error),
    #[error("invalid trust anchor: {0}")]
    TrustAnchor(String),
    #[error("invalid server name '{0}'")]
    InvalidServerName(String),
}

/// A single TLS negotiation failed.
///
/// Never fatal for the server: the raw socket is dropped and the accept loop
/// carries on.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("TLS handshake failed: {0}")]
    Tls(#[source] io::Error),
    #[error("TLS handshake did not complete within {0:?}")]
    TimedOut(Duration),
}
