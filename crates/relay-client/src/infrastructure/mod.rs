//! Infrastructure layer for the relay client: the TLS connection to the relay.

pub mod network;
