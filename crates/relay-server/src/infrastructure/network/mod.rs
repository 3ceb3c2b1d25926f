//! Network infrastructure: the TLS accept loop and connection workers.

pub mod acceptor;
pub mod connection;
pub mod worker;

pub use acceptor::{RelayError, RelayServer, RelaySettings};
pub use connection::{Connection, ConnectionHandle};
pub use worker::{run_worker, ConnectionError, WorkerContext};
