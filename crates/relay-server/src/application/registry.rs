//! ClientRegistry: the set of Active connections used as the broadcast target.
//!
//! The registry is the only mutable state shared between connection tasks.
//! Every access goes through `add`, `remove` and `snapshot`, which run under
//! one async mutex, so no two mutations interleave and no mutation interleaves
//! with a snapshot.
//!
//! # Snapshots
//!
//! [`ClientRegistry::snapshot`] copies the reference-counted peer handles and
//! releases the lock before returning. Callers then do their (possibly slow)
//! network writes without holding it, so a stalled peer never blocks
//! registrations or removals of unrelated connections.
//!
//! # Ordering
//!
//! Entries are kept in the order they were added, which is the order the
//! connections became Active. Broadcasts iterate in that order. This keeps
//! delivery deterministic; it is not a delivery guarantee.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use super::peer::{ConnectionId, Peer};

/// Error type for registry mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection {0} is already registered")]
    Duplicate(ConnectionId),
    #[error("connection {0} could not be activated")]
    NotActivated(ConnectionId),
}

/// Ordered set of Active connections.
#[derive(Default)]
pub struct ClientRegistry {
    entries: Mutex<Vec<Arc<dyn Peer>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a peer and returns the new number of entries.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Duplicate`] if a peer with the same id is present.
    pub async fn add(&self, peer: Arc<dyn Peer>) -> Result<usize, RegistryError> {
        let mut entries = self.entries.lock().await;
        let id = peer.id();
        if entries.iter().any(|p| p.id() == id) {
            return Err(RegistryError::Duplicate(id));
        }
        entries.push(peer);
        Ok(entries.len())
    }

    /// Like [`add`](Self::add), but runs `activate` under the registry lock
    /// and only inserts the peer if it returns `true`. No snapshot can observe
    /// the peer Active but unregistered.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Duplicate`] if the id is present, checked before
    /// `activate` runs; [`RegistryError::NotActivated`] if `activate` refuses.
    pub async fn register<F>(
        &self,
        peer: Arc<dyn Peer>,
        activate: F,
    ) -> Result<usize, RegistryError>
    where
        F: FnOnce() -> bool,
    {
        let mut entries = self.entries.lock().await;
        let id = peer.id();
        if entries.iter().any(|p| p.id() == id) {
            return Err(RegistryError::Duplicate(id));
        }
        if !activate() {
            return Err(RegistryError::NotActivated(id));
        }
        entries.push(peer);
        Ok(entries.len())
    }

    /// Removes the peer with `id`, returning it if it was present.
    pub async fn remove(&self, id: ConnectionId) -> Option<Arc<dyn Peer>> {
        self.deregister(id, || ()).await
    }

    /// Removes the peer with `id` and runs `deactivate` before releasing the
    /// lock, whether or not the peer was present.
    pub async fn deregister<F>(&self, id: ConnectionId, deactivate: F) -> Option<Arc<dyn Peer>>
    where
        F: FnOnce(),
    {
        let mut entries = self.entries.lock().await;
        let removed = entries
            .iter()
            .position(|p| p.id() == id)
            .map(|index| entries.remove(index));
        deactivate();
        removed
    }

    /// Returns a point-in-time copy of all registered peers, in insertion order.
    pub async fn snapshot(&self) -> Vec<Arc<dyn Peer>> {
        self.entries.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.entries.lock().await.iter().any(|p| p.id() == id)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
