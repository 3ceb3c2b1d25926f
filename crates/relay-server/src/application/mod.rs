//! Application layer: connection bookkeeping and broadcast fan-out.
//!
//! Nothing here performs socket I/O directly. Clients are reached through the
//! [`peer::Peer`] trait, implemented by the network layer.

pub mod dispatcher;
pub mod peer;
pub mod registry;

pub use dispatcher::{BroadcastDispatcher, BroadcastReport};
pub use peer::{ConnectionId, ConnectionState, DeliveryError, Peer};
pub use registry::{ClientRegistry, RegistryError};
