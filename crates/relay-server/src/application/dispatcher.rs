//! BroadcastDispatcher: fans one received message out to every other client.
//!
//! A broadcast is:
//!
//! 1. encode the plaintext once with the configured [`WireTransform`];
//! 2. take a registry snapshot;
//! 3. write the encoded bytes to every snapshot entry except the origin, in
//!    snapshot order.
//!
//! A failed write is isolated to its recipient. The recipient records the
//! failure itself (see [`Peer::deliver`](super::peer::Peer::deliver)) and
//! its own worker closes it; the dispatcher only logs and counts it.

use std::sync::Arc;

use relay_core::WireTransform;
use tracing::{debug, warn};

use super::peer::ConnectionId;
use super::registry::ClientRegistry;

/// Outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients a write was attempted on (the snapshot minus the origin).
    pub attempted: usize,
    /// Recipients whose write completed.
    pub delivered: usize,
    /// Recipients whose write failed.
    pub failed: Vec<ConnectionId>,
}

/// Sends messages from one client to all other registered clients.
pub struct BroadcastDispatcher {
    registry: Arc<ClientRegistry>,
    transform: WireTransform,
}

impl BroadcastDispatcher {
    pub fn new(registry: Arc<ClientRegistry>, transform: WireTransform) -> Self {
        Self {
            registry,
            transform,
        }
    }

    pub fn transform(&self) -> WireTransform {
        self.transform
    }

    /// Sends `plaintext` to every registered peer except `origin`.
    ///
    /// Never fails as a whole; per-recipient failures are reported in the
    /// returned [`BroadcastReport`].
    pub async fn broadcast(&self, plaintext: &[u8], origin: ConnectionId) -> BroadcastReport {
        let wire = self.transform.encode(plaintext);
        let recipients = self.registry.snapshot().await;

        let mut report = BroadcastReport::default();
        for peer in recipients.iter().filter(|p| p.id() != origin) {
            report.attempted += 1;
            match peer.deliver(&wire).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("broadcast from {origin} to {} failed: {e}", peer.id());
                    report.failed.push(peer.id());
                }
            }
        }

        debug!(
            "broadcast from {origin}: {} bytes, {}/{} delivered",
            wire.len(),
            report.delivered,
            report.attempted
        );
        report
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
