//! Secure broadcast relay server, entry point.
//!
//! Accepts TLS clients and forwards every chunk of bytes one client sends to
//! all other connected clients.
//!
//! # Usage
//!
//! ```text
//! relay-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>        TOML configuration file [default: relay.toml]
//!   --bind <IP>            Listen address (overrides server.bind_address)
//!   --port <PORT>          Listen port (overrides server.port)
//!   --max-clients <N>      Connection limit (overrides server.max_clients)
//!   --cert <PATH>          PEM certificate chain (overrides tls.cert_path)
//!   --key <PATH>           PEM private key (overrides tls.key_path)
//!   --no-obfuscation       Send payloads without the shift transform
//!   --print-config         Print the effective configuration and exit
//! ```
//!
//! Each option also reads a `RELAY_*` environment variable; command-line
//! values win. Log verbosity comes from `RUST_LOG`, falling back to
//! `server.log_level`.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use relay_core::security::build_acceptor;
use relay_core::ShutdownSignal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relay_server::infrastructure::network::RelayServer;
use relay_server::infrastructure::storage::config::{load_config, render_config, AppConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Secure broadcast relay server.
#[derive(Debug, Parser)]
#[command(
    name = "relay-server",
    about = "TLS relay that forwards each client's messages to every other client",
    version
)]
struct Cli {
    /// TOML configuration file. A missing file means "all defaults".
    #[arg(long, default_value = "relay.toml", env = "RELAY_CONFIG")]
    config: PathBuf,

    /// IP address to listen on.
    #[arg(long, env = "RELAY_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "RELAY_PORT")]
    port: Option<u16>,

    /// Maximum number of concurrent clients.
    #[arg(long, env = "RELAY_MAX_CLIENTS")]
    max_clients: Option<usize>,

    /// PEM file with the server certificate chain.
    #[arg(long, env = "RELAY_CERT")]
    cert: Option<PathBuf>,

    /// PEM file with the server private key.
    #[arg(long, env = "RELAY_KEY")]
    key: Option<PathBuf>,

    /// Disable the shift transform. Clients must be started with the same setting.
    #[arg(long, env = "RELAY_NO_OBFUSCATION")]
    no_obfuscation: bool,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration.
    fn apply_overrides(&self, mut config: AppConfig) -> AppConfig {
        if let Some(bind) = &self.bind {
            config.server.bind_address = bind.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(max) = self.max_clients {
            config.server.max_clients = max;
        }
        if let Some(cert) = &self.cert {
            config.tls.cert_path = cert.clone();
        }
        if let Some(key) = &self.key {
            config.tls.key_path = key.clone();
        }
        if self.no_obfuscation {
            config.server.obfuscation = false;
        }
        config
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let file_config = load_config(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    let config = cli.apply_overrides(file_config);

    if cli.print_config {
        print!("{}", render_config(&config)?);
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    let settings = config.validate().context("invalid configuration")?;

    let acceptor = build_acceptor(&config.tls.cert_path, &config.tls.key_path).with_context(|| {
        format!(
            "failed to load TLS credentials ({}, {})",
            config.tls.cert_path.display(),
            config.tls.key_path.display()
        )
    })?;

    let server = RelayServer::bind(settings, acceptor).await?;

    let shutdown = ShutdownSignal::new();
    let on_ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                on_ctrl_c.trigger();
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    server.run(shutdown).await;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["relay-server"]);

        assert_eq!(cli.config, PathBuf::from("relay.toml"));
        assert!(cli.bind.is_none());
        assert!(cli.port.is_none());
        assert!(!cli.no_obfuscation);
        assert!(!cli.print_config);
    }

    #[test]
    fn test_no_overrides_keep_file_values() {
        // Arrange
        let cli = Cli::parse_from(["relay-server"]);
        let mut file = AppConfig::default();
        file.server.port = 9001;

        // Act
        let merged = cli.apply_overrides(file.clone());

        // Assert
        assert_eq!(merged, file);
    }

    #[test]
    fn test_overrides_replace_file_values() {
        // Arrange
        let cli = Cli::parse_from([
            "relay-server",
            "--bind",
            "127.0.0.1",
            "--port",
            "9443",
            "--max-clients",
            "2",
            "--cert",
            "/tmp/c.pem",
            "--key",
            "/tmp/k.pem",
            "--no-obfuscation",
        ]);

        // Act
        let merged = cli.apply_overrides(AppConfig::default());

        // Assert
        assert_eq!(merged.server.bind_address, "127.0.0.1");
        assert_eq!(merged.server.port, 9443);
        assert_eq!(merged.server.max_clients, 2);
        assert_eq!(merged.tls.cert_path, PathBuf::from("/tmp/c.pem"));
        assert_eq!(merged.tls.key_path, PathBuf::from("/tmp/k.pem"));
        assert!(!merged.server.obfuscation);
    }

    #[test]
    fn test_invalid_override_is_caught_by_validation() {
        let cli = Cli::parse_from(["relay-server", "--max-clients", "0"]);
        let merged = cli.apply_overrides(AppConfig::default());
        assert!(merged.validate().is_err());
    }
}
