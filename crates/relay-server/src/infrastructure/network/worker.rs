//! Per-connection worker: read → decode → broadcast until the connection ends.
//!
//! The idle limit counts traffic in both directions. A client that only
//! listens stays connected as long as broadcasts reach it.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use relay_core::{ReadOutcome, ShutdownSignal, WireTransform};
use thiserror::Error;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::connection::{Connection, ConnectionHandle};
use crate::application::{BroadcastDispatcher, ClientRegistry};

/// Why a worker stopped serving its connection.
///
/// None of these propagate past the worker; they are logged and the
/// connection is closed.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("peer closed the stream")]
    StreamEnd,
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
    #[error("no data received for {0:?}")]
    IdleTimeout(Duration),
    #[error("a broadcast write to this connection failed")]
    DeliveryFailed,
    #[error("server is shutting down")]
    Shutdown,
}

impl ConnectionError {
    /// `true` for endings that are part of normal operation.
    pub fn is_orderly(&self) -> bool {
        matches!(self, ConnectionError::StreamEnd | ConnectionError::Shutdown)
    }
}

/// Everything a worker needs besides its own connection.
pub struct WorkerContext {
    pub registry: Arc<ClientRegistry>,
    pub dispatcher: Arc<BroadcastDispatcher>,
    pub shutdown: ShutdownSignal,
    pub read_buffer_size: usize,
    pub idle_timeout: Option<Duration>,
}

impl WorkerContext {
    fn transform(&self) -> WireTransform {
        self.dispatcher.transform()
    }
}

/// Serves `connection` until it ends, then closes it. Returns why it ended.
///
/// The connection must already be Active and registered.
pub async fn run_worker(mut connection: Connection, ctx: &WorkerContext) -> ConnectionError {
    let handle = connection.handle();
    let id = connection.id();
    let transform = ctx.transform();

    let reason = loop {
        tokio::select! {
            _ = ctx.shutdown.wait() => break ConnectionError::Shutdown,
            _ = handle.failure_recorded() => break ConnectionError::DeliveryFailed,
            outcome = read_next(&mut connection, &handle, ctx) => match outcome {
                Ok(ReadOutcome::Chunk(mut chunk)) => {
                    transform.decode_in_place(&mut chunk);
                    debug!(
                        conn = %id,
                        peer = %handle.peer_addr(),
                        bytes = chunk.len(),
                        "received: {}",
                        String::from_utf8_lossy(&chunk)
                    );
                    ctx.dispatcher.broadcast(&chunk, id).await;
                }
                Ok(ReadOutcome::EndOfStream) => break ConnectionError::StreamEnd,
                Err(e) => break e,
            },
        }
    };

    connection.close(&ctx.registry).await;

    if reason.is_orderly() {
        info!(conn = %id, peer = %handle.peer_addr(), label = handle.label(), "client disconnected: {reason}");
    } else {
        warn!(conn = %id, peer = %handle.peer_addr(), label = handle.label(), "client dropped: {reason}");
    }
    reason
}

/// Waits for the next chunk. Fails with `IdleTimeout` only once nothing has
/// been read from or written to the connection for the whole limit.
async fn read_next(
    connection: &mut Connection,
    handle: &ConnectionHandle,
    ctx: &WorkerContext,
) -> Result<ReadOutcome, ConnectionError> {
    let Some(limit) = ctx.idle_timeout else {
        return Ok(connection.read(ctx.read_buffer_size).await?);
    };

    let read = connection.read(ctx.read_buffer_size);
    tokio::pin!(read);
    loop {
        let deadline = handle.last_activity() + limit;
        tokio::select! {
            outcome = &mut read => {
                let outcome = outcome?;
                if matches!(outcome, ReadOutcome::Chunk(_)) {
                    handle.touch();
                }
                return Ok(outcome);
            }
            _ = sleep_until(deadline) => {
                if handle.last_activity() + limit <= Instant::now() {
                    return Err(ConnectionError::IdleTimeout(limit));
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
