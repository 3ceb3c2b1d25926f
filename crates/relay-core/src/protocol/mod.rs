//! Wire-level payload handling.
//!
//! - [`obfuscation`] – the byte-shift transform applied to every payload.
//! - [`chunk`] – bounded reads; one read call is one message.

pub mod chunk;
pub mod obfuscation;
