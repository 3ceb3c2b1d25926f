//! One accepted client: a shared write side and a worker-owned read side.
//!
//! The decrypted session is split in two:
//!
//! - [`ConnectionHandle`] holds the write half behind an async mutex. It is
//!   shared (`Arc`) between the registry, where broadcasts reach it through
//!   [`Peer::deliver`], and the owning worker.
//! - [`Connection`] holds the read half and is owned by exactly one worker.
//!   Consuming it with [`Connection::close`] is the only way to tear the
//!   connection down, which is what makes closing happen exactly once.
//!
//! Closing takes the writer lock first and removes the entry from the registry
//! while holding it. A broadcast that picked this connection out of an older
//! snapshot therefore either finishes its write before removal or finds the
//! connection no longer Active; it never writes after removal. State changes
//! to and from Active happen under the registry lock, so a snapshot never
//! sees an Active connection that is not registered.
//!
//! Once a write has failed, part of a message may already be on the wire.
//! Later writes are refused so nothing is appended to the cut-off message.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relay_core::{read_chunk, ReadOutcome};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, Notify};
use tokio::time::{timeout, Instant};
use tracing::debug;

use crate::application::{
    ClientRegistry, ConnectionId, ConnectionState, DeliveryError, Peer, RegistryError,
};

type BoxedReader = Box<dyn AsyncRead + Send + Sync + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Label shown in logs for connections that never set one.
pub const UNSET_LABEL: &str = "unknown";

/// Shared, write-side view of a connection.
pub struct ConnectionHandle {
    id: ConnectionId,
    peer_addr: SocketAddr,
    label: Option<String>,
    state: AtomicU8,
    writer: Mutex<Option<BoxedWriter>>,
    write_timeout: Duration,
    write_failed: AtomicBool,
    failure: Notify,
    opened_at: Instant,
    /// Milliseconds after `opened_at` of the last successful read or write.
    last_activity_ms: AtomicU64,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(UNSET_LABEL)
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `true` once a broadcast write to this connection has failed.
    pub fn has_failed(&self) -> bool {
        self.write_failed.load(Ordering::Acquire)
    }

    /// Resolves once a write failure has been recorded.
    ///
    /// A failure recorded before the first call is not lost: `Notify` keeps
    /// one permit for the next waiter.
    pub async fn failure_recorded(&self) {
        if self.has_failed() {
            return;
        }
        self.failure.notified().await;
    }

    /// When data last moved in either direction.
    pub fn last_activity(&self) -> Instant {
        self.opened_at + Duration::from_millis(self.last_activity_ms.load(Ordering::Acquire))
    }

    pub(crate) fn touch(&self) {
        let elapsed = u64::try_from(self.opened_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_activity_ms.fetch_max(elapsed, Ordering::AcqRel);
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn record_failure(&self) {
        self.write_failed.store(true, Ordering::Release);
        self.failure.notify_one();
    }

    async fn write(&self, wire: &[u8]) -> Result<(), DeliveryError> {
        let mut guard = self.writer.lock().await;
        if self.state() != ConnectionState::Active || self.has_failed() {
            return Err(DeliveryError::Closed);
        }
        let writer = guard.as_mut().ok_or(DeliveryError::Closed)?;

        let attempt = async {
            writer.write_all(wire).await?;
            writer.flush().await
        };
        let result = match timeout(self.write_timeout, attempt).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(DeliveryError::Io(e)),
            Err(_) => Err(DeliveryError::TimedOut(self.write_timeout)),
        };
        match result {
            Ok(()) => self.touch(),
            Err(_) => self.record_failure(),
        }
        result
    }
}

#[async_trait]
impl Peer for ConnectionHandle {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn deliver(&self, wire: &[u8]) -> Result<(), DeliveryError> {
        self.write(wire).await
    }
}

/// Worker-owned side of a connection.
pub struct Connection {
    handle: Arc<ConnectionHandle>,
    reader: BoxedReader,
}

impl Connection {
    /// Wraps an established session. The connection starts out Handshaking
    /// and becomes visible to broadcasts only after [`activate`](Self::activate).
    pub fn new<S>(
        stream: S,
        peer_addr: SocketAddr,
        label: Option<String>,
        write_timeout: Duration,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Sync + 'static,
    {
        let (reader, writer): (ReadHalf<S>, WriteHalf<S>) = tokio::io::split(stream);
        let handle = ConnectionHandle {
            id: ConnectionId::new(),
            peer_addr,
            label,
            state: AtomicU8::new(ConnectionState::Handshaking as u8),
            writer: Mutex::new(Some(Box::new(writer))),
            write_timeout,
            write_failed: AtomicBool::new(false),
            failure: Notify::new(),
            opened_at: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
        };
        Self {
            handle: Arc::new(handle),
            reader: Box::new(reader),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.handle.id
    }

    pub fn handle(&self) -> Arc<ConnectionHandle> {
        Arc::clone(&self.handle)
    }

    /// Handshaking → Active. Returns `false` if the connection was not Handshaking.
    pub fn activate(&self) -> bool {
        self.handle
            .state
            .compare_exchange(
                ConnectionState::Handshaking as u8,
                ConnectionState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Activates the connection and adds it to `registry` in one step.
    ///
    /// # Errors
    ///
    /// [`RegistryError`] if the id is already registered or the connection
    /// was not Handshaking.
    pub async fn register(&self, registry: &ClientRegistry) -> Result<usize, RegistryError> {
        registry
            .register(self.handle() as Arc<dyn Peer>, || self.activate())
            .await
    }

    /// Reads the next chunk of at most `max` bytes.
    pub async fn read(&mut self, max: usize) -> io::Result<ReadOutcome> {
        read_chunk(&mut self.reader, max).await
    }

    /// Tears the connection down: removes it from `registry`, sends the TLS
    /// close_notify, and releases both halves of the session.
    pub async fn close(self, registry: &ClientRegistry) {
        let Connection { handle, reader } = self;

        let taken = {
            let mut writer = handle.writer.lock().await;
            let removed = registry
                .deregister(handle.id, || handle.set_state(ConnectionState::Closing))
                .await
                .is_some();
            debug!(conn = %handle.id, removed, "connection closing");
            writer.take()
        };

        if let Some(mut writer) = taken {
            // Best effort: the peer may already be gone.
            let _ = timeout(handle.write_timeout, writer.shutdown()).await;
        }
        drop(reader);
        handle.set_state(ConnectionState::Closed);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
