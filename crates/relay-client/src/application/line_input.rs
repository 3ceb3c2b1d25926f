//! Bounded line reader for console input.
//!
//! Yields one line at a time, but never more than `max` bytes of text: a
//! longer line comes out as several pieces, the last one carrying the
//! newline. Each piece says whether it is a whole line on its own. All
//! progress is kept in the struct, so `next_line` can be dropped inside a
//! `tokio::select!` and resumed without losing input.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// One piece of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputLine {
    /// At most `max` bytes of text, plus the newline if the line ended here.
    pub bytes: Vec<u8>,
    /// `true` if the piece starts a line and the line ends with it, either at
    /// a newline or at end of input.
    pub whole: bool,
}

/// Splits buffered input into lines of at most `max` bytes.
pub struct BoundedLines<R> {
    reader: R,
    max: usize,
    pending: Vec<u8>,
    at_line_start: bool,
}

impl<R: AsyncBufRead + Unpin> BoundedLines<R> {
    /// `max` must be at least one byte.
    pub fn new(reader: R, max: usize) -> Self {
        let max = max.max(1);
        Self {
            reader,
            max,
            pending: Vec::with_capacity(max + 1),
            at_line_start: true,
        }
    }

    /// Next piece of input including its trailing newline, if any.
    /// `None` at end of input.
    pub async fn next_line(&mut self) -> io::Result<Option<InputLine>> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.finish(true)));
            }

            if self.pending.len() == self.max {
                // A full piece ends the line only if the newline comes next.
                let ends_line = available[0] == b'\n';
                if ends_line {
                    self.pending.push(b'\n');
                    self.reader.consume(1);
                }
                return Ok(Some(self.finish(ends_line)));
            }

            let room = self.max - self.pending.len();
            let window = &available[..available.len().min(room)];
            let (taken, complete) = match window.iter().position(|&b| b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (window.len(), false),
            };
            self.pending.extend_from_slice(&window[..taken]);
            self.reader.consume(taken);

            if complete {
                return Ok(Some(self.finish(true)));
            }
        }
    }

    fn finish(&mut self, ends_line: bool) -> InputLine {
        let piece = InputLine {
            bytes: std::mem::take(&mut self.pending),
            whole: self.at_line_start && ends_line,
        };
        self.at_line_start = ends_line;
        piece
    }
}
