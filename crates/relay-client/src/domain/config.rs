//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

use relay_core::security::ServerTrust;
use relay_core::{WireTransform, MAX_CHUNK_SIZE};
use thiserror::Error;

/// Invalid client settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClientConfigError {
    #[error("no trust anchor given: pass --ca-cert <PEM> or, for testing only, --insecure")]
    MissingTrust,
    #[error("--max-line must be between 1 and {MAX_CHUNK_SIZE}, got {0}")]
    InvalidMaxLine(usize),
}

/// How the session interleaves sending and receiving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// Print inbound data as it arrives while reading input.
    #[default]
    Duplex,
    /// After each sent line, wait for exactly one inbound read.
    Lockstep,
}

/// Fully resolved client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Name used for SNI and certificate matching.
    pub server_name: String,
    pub trust: ServerTrust,
    /// Longest single write; longer input lines are split.
    pub max_line: usize,
    pub mode: SessionMode,
    pub transform: WireTransform,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl ClientConfig {
    /// `host:port` as passed to the resolver.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Chooses how the server certificate is checked.
///
/// # Errors
///
/// [`ClientConfigError::MissingTrust`] when neither a CA file nor the
/// explicit insecure switch was given.
pub fn resolve_trust(
    ca_cert: Option<PathBuf>,
    insecure: bool,
) -> Result<ServerTrust, ClientConfigError> {
    match (ca_cert, insecure) {
        (Some(path), _) => Ok(ServerTrust::Anchors(path)),
        (None, true) => Ok(ServerTrust::AcceptAny),
        (None, false) => Err(ClientConfigError::MissingTrust),
    }
}

/// Checks the per-write input bound.
///
/// # Errors
///
/// [`ClientConfigError::InvalidMaxLine`] if `max_line` is zero or too large.
pub fn validate_max_line(max_line: usize) -> Result<usize, ClientConfigError> {
    if (1..=MAX_CHUNK_SIZE).contains(&max_line) {
        Ok(max_line)
    } else {
        Err(ClientConfigError::InvalidMaxLine(max_line))
    }
}
