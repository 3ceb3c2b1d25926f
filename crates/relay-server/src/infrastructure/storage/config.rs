//! TOML configuration for the relay server.
//!
//! Every field is optional. A missing file, a missing section and a missing
//! key all fall back to the defaults below, so the server runs with no
//! configuration at all:
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! port = 8080
//! max_clients = 10
//! read_buffer_size = 1024
//! obfuscation = true
//! log_level = "info"
//!
//! [timeouts]
//! handshake_secs = 10
//! write_secs = 10
//! idle_secs = 300      # 0 disables the idle timeout
//!
//! [tls]
//! cert_path = "server-cert.pem"
//! key_path = "server-key.pem"
//! ```
//!
//! [`AppConfig::validate`] turns the file model into [`RelaySettings`], the
//! runtime form consumed by the network layer.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use relay_core::{WireTransform, MAX_CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::network::RelaySettings;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error other than "not found".
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range or malformed.
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub timeouts: TimeoutSection,
    #[serde(default)]
    pub tls: TlsSection,
}

/// Listener and relay behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// IP address to bind. `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum number of concurrent connections, including handshakes in progress.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Upper bound of a single read; larger messages arrive as several chunks.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Apply the shift transform on the wire. Clients must use the same setting.
    #[serde(default = "default_true")]
    pub obfuscation: bool,
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Timeouts, in whole seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutSection {
    #[serde(default = "default_handshake_secs")]
    pub handshake_secs: u64,
    #[serde(default = "default_write_secs")]
    pub write_secs: u64,
    /// `0` disables the idle timeout.
    #[serde(default = "default_idle_secs")]
    pub idle_secs: u64,
}

/// PEM credential locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TlsSection {
    #[serde(default = "default_cert_path")]
    pub cert_path: PathBuf,
    #[serde(default = "default_key_path")]
    pub key_path: PathBuf,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_max_clients() -> usize {
    10
}
fn default_read_buffer_size() -> usize {
    relay_core::DEFAULT_CHUNK_SIZE
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_handshake_secs() -> u64 {
    10
}
fn default_write_secs() -> u64 {
    10
}
fn default_idle_secs() -> u64 {
    300
}
fn default_cert_path() -> PathBuf {
    PathBuf::from("server-cert.pem")
}
fn default_key_path() -> PathBuf {
    PathBuf::from("server-key.pem")
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            max_clients: default_max_clients(),
            read_buffer_size: default_read_buffer_size(),
            obfuscation: default_true(),
            log_level: default_log_level(),
        }
    }
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            handshake_secs: default_handshake_secs(),
            write_secs: default_write_secs(),
            idle_secs: default_idle_secs(),
        }
    }
}

impl Default for TlsSection {
    fn default() -> Self {
        Self {
            cert_path: default_cert_path(),
            key_path: default_key_path(),
        }
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Checks every value and converts the file model into runtime settings.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<RelaySettings, ConfigError> {
        let ip: IpAddr = self
            .server
            .bind_address
            .parse()
            .map_err(|_| ConfigError::Invalid {
                field: "server.bind_address",
                reason: format!("'{}' is not an IP address", self.server.bind_address),
            })?;

        if self.server.max_clients == 0 {
            return Err(ConfigError::Invalid {
                field: "server.max_clients",
                reason: "must be at least 1".to_string(),
            });
        }

        if !(1..=MAX_CHUNK_SIZE).contains(&self.server.read_buffer_size) {
            return Err(ConfigError::Invalid {
                field: "server.read_buffer_size",
                reason: format!(
                    "{} is outside 1..={MAX_CHUNK_SIZE}",
                    self.server.read_buffer_size
                ),
            });
        }

        if self.timeouts.handshake_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "timeouts.handshake_secs",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.timeouts.write_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "timeouts.write_secs",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(RelaySettings {
            bind_addr: SocketAddr::new(ip, self.server.port),
            max_clients: self.server.max_clients,
            read_buffer_size: self.server.read_buffer_size,
            handshake_timeout: Duration::from_secs(self.timeouts.handshake_secs),
            write_timeout: Duration::from_secs(self.timeouts.write_secs),
            idle_timeout: match self.timeouts.idle_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            transform: WireTransform::from_enabled(self.server.obfuscation),
        })
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Renders `config` as TOML text.
///
/// # Errors
///
/// [`ConfigError::Serialize`] if serialization fails.
pub fn render_config(config: &AppConfig) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(config)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
