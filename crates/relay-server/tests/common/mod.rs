//! Shared helpers for the loopback relay tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use relay_core::security::{
    build_acceptor, build_connector, handshake_as_client, server_name, ClientSession, ServerTrust,
};
use relay_core::{HandshakeError, ShutdownSignal, WireTransform};
use relay_server::application::ClientRegistry;
use relay_server::infrastructure::network::{RelayServer, RelaySettings};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("relay-core")
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// A relay running on an ephemeral loopback port.
pub struct RunningRelay {
    pub addr: SocketAddr,
    pub registry: Arc<ClientRegistry>,
    pub shutdown: ShutdownSignal,
    pub task: JoinHandle<()>,
}

impl RunningRelay {
    pub async fn start(max_clients: usize) -> Self {
        Self::start_with(RelaySettings {
            max_clients,
            ..RelaySettings::default()
        })
        .await
    }

    /// Starts a relay with `settings`, bound to an ephemeral loopback port.
    pub async fn start_with(settings: RelaySettings) -> Self {
        let settings = RelaySettings {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..settings
        };
        let acceptor = build_acceptor(&fixture("server-cert.pem"), &fixture("server-key.pem"))
            .expect("fixture credentials must load");
        let server = RelayServer::bind(settings, acceptor).await.unwrap();
        let addr = server.local_addr().unwrap();
        let registry = server.registry();
        let shutdown = ShutdownSignal::new();
        let task = tokio::spawn(server.run(shutdown.clone()));
        Self {
            addr,
            registry,
            shutdown,
            task,
        }
    }

    /// Polls until the registry holds exactly `expected` connections.
    pub async fn wait_for_clients(&self, expected: usize) {
        tokio::time::timeout(WAIT, async {
            while self.registry.len().await != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("registry never reached {expected} connections"));
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(WAIT, self.task)
            .await
            .expect("relay must stop after shutdown")
            .unwrap();
    }
}

/// Minimal TLS client that speaks the shift-transformed wire format.
pub struct TestClient {
    session: ClientSession,
}

impl TestClient {
    pub async fn try_connect(addr: SocketAddr) -> Result<Self, HandshakeError> {
        let connector = build_connector(&ServerTrust::Anchors(fixture("ca-cert.pem"))).unwrap();
        let stream = TcpStream::connect(addr).await.unwrap();
        let session =
            handshake_as_client(&connector, server_name("localhost").unwrap(), stream, WAIT)
                .await?;
        Ok(Self { session })
    }

    pub async fn connect(addr: SocketAddr) -> Self {
        Self::try_connect(addr).await.expect("handshake must succeed")
    }

    pub async fn send(&mut self, plaintext: &[u8]) {
        let wire = WireTransform::Shift.encode(plaintext);
        self.session.write_all(&wire).await.unwrap();
        self.session.flush().await.unwrap();
    }

    /// Next decoded chunk, or `None` if nothing arrives within `wait`.
    pub async fn recv_within(&mut self, wait: Duration) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; 1024];
        match tokio::time::timeout(wait, self.session.read(&mut buf)).await {
            Ok(Ok(n)) if n > 0 => {
                buf.truncate(n);
                WireTransform::Shift.decode_in_place(&mut buf);
                Some(buf)
            }
            _ => None,
        }
    }

    pub async fn recv(&mut self) -> Vec<u8> {
        self.recv_within(WAIT).await.expect("expected a message")
    }

    /// `true` if the server closed the session.
    pub async fn sees_end_of_stream(&mut self) -> bool {
        let mut buf = [0u8; 64];
        matches!(
            tokio::time::timeout(WAIT, self.session.read(&mut buf)).await,
            Ok(Ok(0)) | Ok(Err(_))
        )
    }

    pub async fn disconnect(mut self) {
        let _ = self.session.shutdown().await;
    }
}
