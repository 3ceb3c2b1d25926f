//! # relay-core
//!
//! Shared library for the secure broadcast relay. Both the server and the
//! interactive client depend on it.
//!
//! # Architecture overview
//!
//! The relay accepts many TLS clients and forwards whatever one client sends
//! to every other connected client. This crate holds the pieces both ends of
//! a connection must agree on:
//!
//! - **`protocol`** – How payload bytes travel. There is no message header:
//!   a message is whatever one read call returns (see [`protocol::chunk`]),
//!   and every payload passes through the reversible
//!   [`WireTransform`](protocol::obfuscation::WireTransform) on top of TLS.
//!
//! - **`security`** – Loading PEM credentials and building the rustls
//!   server/client configurations, plus bounded-time handshakes.
//!
//! - **`shutdown`** – A cloneable shutdown signal observed by accept loops,
//!   workers and the client session.

pub mod protocol;
pub mod security;
pub mod shutdown;

pub use protocol::chunk::{read_chunk, ReadOutcome, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
pub use protocol::obfuscation::{decode, encode, WireTransform};
pub use security::{CredentialError, HandshakeError};
pub use shutdown::ShutdownSignal;
