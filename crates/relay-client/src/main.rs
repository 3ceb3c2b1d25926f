//! Interactive relay client, entry point.
//!
//! Reads lines from stdin and sends each one to the relay; prints every
//! message relayed from other clients as `> <text>`. Type `/quit` or close
//! stdin to leave.
//!
//! # Usage
//!
//! ```text
//! relay-client --ca-cert ca-cert.pem [OPTIONS]
//!
//! Options:
//!   --host <HOST>          Relay host [default: 127.0.0.1]
//!   --port <PORT>          Relay port [default: 8080]
//!   --server-name <NAME>   Name to verify in the server certificate [default: localhost]
//!   --ca-cert <PATH>       PEM file with the CA that signed the server certificate
//!   --insecure             Skip server certificate verification (testing only)
//!   --max-line <BYTES>     Longest single write [default: 1024]
//!   --lockstep             Wait for one reply after every sent line
//!   --no-obfuscation       Send payloads without the shift transform
//! ```
//!
//! Logs go to stderr at `warn` unless `RUST_LOG` says otherwise, so they do
//! not mix with chat output.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use relay_core::{ShutdownSignal, WireTransform, DEFAULT_CHUNK_SIZE};
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relay_client::application::{run_session, SessionEnd, SessionOptions};
use relay_client::domain::config::validate_max_line;
use relay_client::domain::{resolve_trust, ClientConfig, SessionMode};
use relay_client::infrastructure::network::connect;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Interactive client for the secure broadcast relay.
#[derive(Debug, Parser)]
#[command(
    name = "relay-client",
    about = "Chat through a secure broadcast relay",
    version
)]
struct Cli {
    /// Relay host name or IP address.
    #[arg(long, default_value = "127.0.0.1", env = "RELAY_HOST")]
    host: String,

    /// Relay TCP port.
    #[arg(long, default_value_t = 8080, env = "RELAY_PORT")]
    port: u16,

    /// Name used for SNI and matched against the server certificate.
    #[arg(long, default_value = "localhost", env = "RELAY_SERVER_NAME")]
    server_name: String,

    /// PEM file with the trusted CA certificate(s).
    #[arg(long, env = "RELAY_CA_CERT", conflicts_with = "insecure")]
    ca_cert: Option<PathBuf>,

    /// Accept any server certificate. Traffic is still encrypted but the
    /// server is not authenticated.
    #[arg(long)]
    insecure: bool,

    /// Longest single write in bytes; longer lines are split.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, env = "RELAY_MAX_LINE")]
    max_line: usize,

    /// After each sent line, block until one reply arrives.
    #[arg(long)]
    lockstep: bool,

    /// Disable the shift transform. Must match the server.
    #[arg(long, env = "RELAY_NO_OBFUSCATION")]
    no_obfuscation: bool,

    /// Seconds to wait for the TCP connection and for the TLS handshake.
    #[arg(long, default_value_t = 10, env = "RELAY_CONNECT_TIMEOUT")]
    connect_timeout: u64,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`ClientConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if no trust option was chosen or `--max-line` is out
    /// of range.
    fn into_client_config(self) -> anyhow::Result<ClientConfig> {
        let trust = resolve_trust(self.ca_cert, self.insecure)?;
        let max_line = validate_max_line(self.max_line)?;
        let timeout = Duration::from_secs(self.connect_timeout);

        Ok(ClientConfig {
            host: self.host,
            port: self.port,
            server_name: self.server_name,
            trust,
            max_line,
            mode: if self.lockstep {
                SessionMode::Lockstep
            } else {
                SessionMode::Duplex
            },
            transform: WireTransform::from_enabled(!self.no_obfuscation),
            connect_timeout: timeout,
            handshake_timeout: timeout,
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = Cli::parse().into_client_config()?;

    let session = connect(&config)
        .await
        .with_context(|| format!("could not reach relay at {}", config.address()))?;
    eprintln!("connected to {}; type /quit to leave", config.address());

    let shutdown = ShutdownSignal::new();
    let on_ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => on_ctrl_c.trigger(),
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    let options = SessionOptions {
        mode: config.mode,
        max_line: config.max_line,
        transform: config.transform,
    };
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();

    let end = run_session(session, stdin, &mut stdout, options, &shutdown).await?;
    if end == SessionEnd::ServerClosed {
        eprintln!("relay closed the connection");
    }
    info!(?end, "session ended");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
