//! Bounded chunk reads.
//!
//! The relay defines no framing of its own. A "message" is whatever a single
//! `read` call on the decrypted stream returns, capped at a fixed size:
//!
//! - a read that fills the buffer is a *fragment*, not an error; the rest of
//!   the sender's bytes arrive on the following reads;
//! - a read of zero bytes is an orderly end of stream.
//!
//! A sender's single logical message may therefore reach its peers split over
//! several broadcasts. Callers that need stronger boundaries must add their own
//! framing inside the payload.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Default per-read limit (1 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Largest per-read limit accepted by configuration validation.
pub const MAX_CHUNK_SIZE: usize = 64 * 1024;

/// Result of one bounded read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Between 1 and `max` bytes were read.
    Chunk(Vec<u8>),
    /// The peer closed its side of the stream.
    EndOfStream,
}

/// Reads at most `max` bytes from `reader` into a freshly owned buffer.
///
/// # Errors
///
/// Propagates the underlying I/O error. `max == 0` is rejected with
/// [`io::ErrorKind::InvalidInput`] because a zero-length read cannot be told
/// apart from end of stream.
pub async fn read_chunk<R>(reader: &mut R, max: usize) -> io::Result<ReadOutcome>
where
    R: AsyncRead + Unpin + ?Sized,
{
    if max == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "chunk size must be at least one byte",
        ));
    }

    let mut buf = vec![0u8; max];
    let n = reader.read(&mut buf).await?;
    if n == 0 {
        return Ok(ReadOutcome::EndOfStream);
    }
    buf.truncate(n);
    Ok(ReadOutcome::Chunk(buf))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
