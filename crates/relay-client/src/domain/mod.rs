//! Domain types for the relay client.

pub mod config;

pub use config::{resolve_trust, ClientConfig, ClientConfigError, SessionMode};
