//! PEM credential loading.
//!
//! The server needs a certificate chain and a private key; the client needs
//! the certificates it trusts as roots. All three are plain PEM files.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::RootCertStore;
use tracing::debug;

use super::CredentialError;

fn open(kind: &'static str, path: &Path) -> Result<BufReader<File>, CredentialError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| CredentialError::Io {
            kind,
            path: path.to_path_buf(),
            source,
        })
}

/// Loads every certificate in the PEM file at `path`, leaf first.
///
/// # Errors
///
/// [`CredentialError::Io`] if the file cannot be read or holds a malformed
/// PEM section, [`CredentialError::NoCertificate`] if it holds none.
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, CredentialError> {
    let mut reader = open("certificate", path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| CredentialError::Io {
            kind: "certificate",
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(CredentialError::NoCertificate(path.to_path_buf()));
    }
    debug!("loaded {} certificate(s) from {}", certs.len(), path.display());
    Ok(certs)
}

/// Loads the first private key (PKCS#8, PKCS#1 or SEC1) in the PEM file at `path`.
///
/// # Errors
///
/// [`CredentialError::Io`] if the file cannot be read,
/// [`CredentialError::NoPrivateKey`] if it holds no key.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, CredentialError> {
    let mut reader = open("private key", path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| CredentialError::Io {
            kind: "private key",
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| CredentialError::NoPrivateKey(path.to_path_buf()))
}

/// Builds a root store from every certificate in the PEM file at `path`.
///
/// # Errors
///
/// Anything [`load_certificates`] returns, plus
/// [`CredentialError::TrustAnchor`] if a certificate cannot act as a root.
pub fn load_trust_anchors(path: &Path) -> Result<RootCertStore, CredentialError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certificates(path)? {
        roots
            .add(cert)
            .map_err(|e| CredentialError::TrustAnchor(e.to_string()))?;
    }
    Ok(roots)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
