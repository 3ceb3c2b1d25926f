//! Connection identity, lifecycle states and the delivery seam.
//!
//! The registry and the dispatcher never touch sockets. They see each client
//! only through the [`Peer`] trait, which the network layer implements on top
//! of a live TLS session and tests implement with recording doubles.
//!
//! # Connection lifecycle
//!
//! ```text
//! Handshaking ──► Active ──► Closing ──► Closed
//! ```
//!
//! - `Handshaking`: TCP accepted, TLS negotiation running. Never registered.
//! - `Active`: session established; present in the registry and reachable by
//!   broadcasts.
//! - `Closing`: EOF, I/O error, timeout or shutdown seen; already removed from
//!   the registry, resources being released.
//! - `Closed`: socket and session released.

use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

/// Unique identifier of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first group of the UUID is plenty to tell connections apart in logs.
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Handshaking = 0,
    Active = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    /// Inverse of `state as u8`. Unknown values map to `Closed`.
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ConnectionState::Handshaking,
            1 => ConnectionState::Active,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// A broadcast write to one recipient failed.
///
/// Isolated to that recipient: the dispatcher logs it and moves on.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("connection is no longer active")]
    Closed,
    #[error("write failed: {0}")]
    Io(#[from] io::Error),
    #[error("write did not complete within {0:?}")]
    TimedOut(Duration),
}

/// A broadcast recipient.
///
/// Implementations must record a failed delivery against themselves so that
/// the connection's own worker notices and closes it.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Peer: Send + Sync {
    /// The connection this peer represents.
    fn id(&self) -> ConnectionId;

    /// Writes already-encoded bytes to the peer.
    async fn deliver(&self, wire: &[u8]) -> Result<(), DeliveryError>;
}
