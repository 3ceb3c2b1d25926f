//! TLS connection to the relay.

use std::io;

use relay_core::security::{build_connector, handshake_as_client, server_name, ClientSession};
use relay_core::{CredentialError, HandshakeError};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::info;

use crate::domain::ClientConfig;

/// Error type for establishing the connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error("failed to connect to {addr}: {source}")]
    Tcp {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("timed out connecting to {0}")]
    TimedOut(String),
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
}

/// Opens a TCP connection to the relay and runs the TLS handshake.
///
/// # Errors
///
/// [`ConnectError`] if the trust configuration cannot be loaded, the TCP
/// connection fails or times out, or the handshake is rejected.
pub async fn connect(config: &ClientConfig) -> Result<ClientSession, ConnectError> {
    let connector = build_connector(&config.trust)?;
    let name = server_name(&config.server_name)?;
    let addr = config.address();

    let stream = match timeout(config.connect_timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(ConnectError::Tcp { addr, source }),
        Err(_) => return Err(ConnectError::TimedOut(addr)),
    };
    // Interactive traffic: small writes should go out immediately.
    let _ = stream.set_nodelay(true);

    let session = handshake_as_client(&connector, name, stream, config.handshake_timeout).await?;
    info!("connected to {addr} ({})", config.server_name);
    Ok(session)
}
