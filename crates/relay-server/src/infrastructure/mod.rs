//! Infrastructure layer for the relay server.
//!
//! Contains the OS-facing adapters: the TLS listener and per-connection
//! workers, and the TOML configuration file.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `relay_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;
