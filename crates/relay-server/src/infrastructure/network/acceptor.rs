//! RelayServer: the TLS accept loop.
//!
//! The listener is bound in [`RelayServer::bind`] so that bind failures
//! surface to the caller before anything else starts. [`RelayServer::run`]
//! then accepts connections until the shutdown signal fires.
//!
//! For every accepted socket:
//!
//! 1. reserve a capacity slot, or drop the socket if none is free;
//! 2. spawn a task that runs the TLS handshake (bounded by the handshake
//!    timeout), so a slow handshake never delays the next `accept`;
//! 3. on success, activate and register the connection and run its worker;
//! 4. release the slot when the task ends.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use relay_core::security::handshake_as_server;
use relay_core::{ShutdownSignal, WireTransform, DEFAULT_CHUNK_SIZE};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use super::connection::Connection;
use super::worker::{run_worker, WorkerContext};
use crate::application::{BroadcastDispatcher, ClientRegistry};

/// Pause after a failed `accept` so a persistent error (e.g. EMFILE) does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Fatal errors returned by the server.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("bind failed on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Runtime settings of the relay.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub bind_addr: SocketAddr,
    pub max_clients: usize,
    pub read_buffer_size: usize,
    pub handshake_timeout: Duration,
    pub write_timeout: Duration,
    /// `None` disables the idle timeout.
    pub idle_timeout: Option<Duration>,
    pub transform: WireTransform,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_clients: 10,
            read_buffer_size: DEFAULT_CHUNK_SIZE,
            handshake_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            idle_timeout: Some(Duration::from_secs(300)),
            transform: WireTransform::Shift,
        }
    }
}

/// A bound, not yet running relay.
pub struct RelayServer {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    settings: RelaySettings,
    registry: Arc<ClientRegistry>,
    slots: Arc<Semaphore>,
}

impl RelayServer {
    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// [`RelayError::Listen`] if the address cannot be bound.
    pub async fn bind(settings: RelaySettings, acceptor: TlsAcceptor) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(settings.bind_addr)
            .await
            .map_err(|source| RelayError::Listen {
                addr: settings.bind_addr,
                source,
            })?;

        Ok(Self {
            listener,
            acceptor,
            slots: Arc::new(Semaphore::new(settings.max_clients)),
            registry: Arc::new(ClientRegistry::new()),
            settings,
        })
    }

    /// The actual bound address (useful when binding port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The registry of Active connections.
    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accepts connections until `shutdown` fires, then waits for every
    /// connection task to close its connection.
    pub async fn run(self, shutdown: ShutdownSignal) {
        let local = self
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| self.settings.bind_addr.to_string());
        info!(
            "relay listening on {local} (max {} clients, obfuscation {})",
            self.settings.max_clients,
            if self.settings.transform.is_enabled() { "on" } else { "off" }
        );

        let ctx = Arc::new(WorkerContext {
            dispatcher: Arc::new(BroadcastDispatcher::new(
                Arc::clone(&self.registry),
                self.settings.transform,
            )),
            registry: Arc::clone(&self.registry),
            shutdown: shutdown.clone(),
            read_buffer_size: self.settings.read_buffer_size,
            idle_timeout: self.settings.idle_timeout,
        });
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!("shutdown requested; stopping accept loop");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => self.admit(stream, peer_addr, &ctx, &mut tasks),
                    Err(e) => {
                        error!("accept error: {e}");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = finished {
                        error!("connection task failed: {e}");
                    }
                }
            }
        }

        drop(self.listener);
        let remaining = tasks.len();
        if remaining > 0 {
            info!("waiting for {remaining} connection(s) to close");
        }
        while let Some(finished) = tasks.join_next().await {
            if let Err(e) = finished {
                error!("connection task failed: {e}");
            }
        }
        info!("relay stopped");
    }

    fn admit(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
        ctx: &Arc<WorkerContext>,
        tasks: &mut JoinSet<()>,
    ) {
        let Ok(slot) = Arc::clone(&self.slots).try_acquire_owned() else {
            warn!(
                peer = %peer_addr,
                "rejecting connection: {} clients already connected",
                self.settings.max_clients
            );
            drop(stream);
            return;
        };

        debug!(peer = %peer_addr, "accepted TCP connection");
        let acceptor = self.acceptor.clone();
        let settings = self.settings.clone();
        let ctx = Arc::clone(ctx);
        tasks.spawn(async move {
            handle_client(stream, peer_addr, acceptor, settings, ctx, slot).await;
        });
    }
}

/// Runs one connection from handshake to close. Holds `slot` throughout.
async fn handle_client(
    stream: TcpStream,
    peer_addr: SocketAddr,
    acceptor: TlsAcceptor,
    settings: RelaySettings,
    ctx: Arc<WorkerContext>,
    _slot: OwnedSemaphorePermit,
) {
    let session = tokio::select! {
        _ = ctx.shutdown.wait() => return,
        result = handshake_as_server(&acceptor, stream, settings.handshake_timeout) => match result {
            Ok(session) => session,
            Err(e) => {
                warn!(peer = %peer_addr, "{e}");
                return;
            }
        },
    };

    let connection = Connection::new(session, peer_addr, None, settings.write_timeout);
    let id = connection.id();
    let count = match connection.register(&ctx.registry).await {
        Ok(count) => count,
        Err(e) => {
            error!(conn = %id, peer = %peer_addr, "{e}");
            return;
        }
    };
    info!(
        conn = %id,
        peer = %peer_addr,
        "client connected ({count}/{})",
        settings.max_clients
    );

    run_worker(connection, &ctx).await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::security::build_acceptor;
    use std::path::PathBuf;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("relay-core")
            .join("tests")
            .join("fixtures")
            .join(name)
    }

    fn acceptor() -> TlsAcceptor {
        build_acceptor(&fixture("server-cert.pem"), &fixture("server-key.pem")).unwrap()
    }

    fn loopback_settings() -> RelaySettings {
        RelaySettings {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..RelaySettings::default()
        }
    }

    #[test]
    fn test_default_settings_match_documented_defaults() {
        let s = RelaySettings::default();
        assert_eq!(s.bind_addr.port(), 8080);
        assert_eq!(s.max_clients, 10);
        assert_eq!(s.read_buffer_size, 1024);
        assert_eq!(s.handshake_timeout, Duration::from_secs(10));
        assert_eq!(s.idle_timeout, Some(Duration::from_secs(300)));
        assert_eq!(s.transform, WireTransform::Shift);
    }

    #[tokio::test]
    async fn test_bind_on_port_zero_reports_real_port() {
        let server = RelayServer::bind(loopback_settings(), acceptor()).await.unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
        assert!(server.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_bind_on_taken_port_is_a_listen_error() {
        // Arrange: occupy a port
        let first = RelayServer::bind(loopback_settings(), acceptor()).await.unwrap();
        let taken = first.local_addr().unwrap();

        // Act
        let settings = RelaySettings {
            bind_addr: taken,
            ..RelaySettings::default()
        };
        let result = RelayServer::bind(settings, acceptor()).await;

        // Assert
        match result {
            Err(RelayError::Listen { addr, .. }) => assert_eq!(addr, taken),
            Ok(_) => panic!("binding a taken port must fail"),
        }
    }

    #[tokio::test]
    async fn test_run_returns_after_shutdown() {
        let server = RelayServer::bind(loopback_settings(), acceptor()).await.unwrap();
        let shutdown = ShutdownSignal::new();
        let task = tokio::spawn(server.run(shutdown.clone()));

        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("run must return once shutdown fires")
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_handshake_registers_nothing() {
        // Arrange
        let server = RelayServer::bind(loopback_settings(), acceptor()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let registry = server.registry();
        let shutdown = ShutdownSignal::new();
        let task = tokio::spawn(server.run(shutdown.clone()));

        // Act: plaintext garbage instead of a ClientHello
        let mut raw = TcpStream::connect(addr).await.unwrap();
        raw.write_all(b"not tls at all\r\n\r\n").await.unwrap();
        let mut sink = Vec::new();
        let _ = tokio::time::timeout(Duration::from_secs(2), raw.read_to_end(&mut sink)).await;

        // Assert
        assert!(registry.is_empty().await);
        shutdown.trigger();
        task.await.unwrap();
    }
}
