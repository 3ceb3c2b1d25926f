//! Interactive session: console input out, relayed messages in.
//!
//! The session is generic over the server stream, the input and the output so
//! it can run against a TLS session and the terminal in production and
//! against in-memory streams in tests.
//!
//! - Outbound: each input line (trailing `\r\n` removed) is encoded with the
//!   configured transform and written. Empty lines are skipped. `/quit` on a
//!   line of its own ends the session without sending anything; a piece of a
//!   longer, split line is always sent.
//! - Inbound: each read is decoded and printed as `> <text>`, with invalid
//!   UTF-8 replaced.

use std::io;

use relay_core::{read_chunk, ReadOutcome, ShutdownSignal, WireTransform, DEFAULT_CHUNK_SIZE};
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::line_input::{BoundedLines, InputLine};
use crate::domain::SessionMode;

/// Input line that ends the session.
pub const QUIT_COMMAND: &str = "/quit";

/// Session behaviour.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub mode: SessionMode,
    pub max_line: usize,
    pub transform: WireTransform,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user typed `/quit`.
    Quit,
    /// Input reached end of file.
    InputClosed,
    /// The server closed the connection.
    ServerClosed,
    /// The shutdown signal fired (Ctrl-C).
    Interrupted,
}

/// What to do with one line of input.
enum Outbound {
    Send(Vec<u8>),
    Skip,
    Quit,
}

fn classify(line: InputLine) -> Outbound {
    let InputLine { mut bytes, whole } = line;
    while matches!(bytes.last(), Some(b'\n' | b'\r')) {
        bytes.pop();
    }
    if bytes.is_empty() {
        Outbound::Skip
    } else if whole && bytes == QUIT_COMMAND.as_bytes() {
        Outbound::Quit
    } else {
        Outbound::Send(bytes)
    }
}

/// Runs the session until input ends, the user quits, the server hangs up,
/// or `shutdown` fires. Closes the write side of `stream` on the way out.
///
/// # Errors
///
/// I/O errors on the stream or the output.
pub async fn run_session<S, I, O>(
    stream: S,
    input: I,
    output: &mut O,
    options: SessionOptions,
    shutdown: &ShutdownSignal,
) -> io::Result<SessionEnd>
where
    S: AsyncRead + AsyncWrite + Unpin,
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut lines = BoundedLines::new(input, options.max_line);

    let end = match options.mode {
        SessionMode::Duplex => {
            duplex(&mut reader, &mut writer, &mut lines, output, options, shutdown).await?
        }
        SessionMode::Lockstep => {
            lockstep(&mut reader, &mut writer, &mut lines, output, options, shutdown).await?
        }
    };

    if end != SessionEnd::ServerClosed {
        if let Err(e) = writer.shutdown().await {
            warn!("failed to close the connection cleanly: {e}");
        }
    }
    debug!(?end, "session finished");
    Ok(end)
}

async fn duplex<R, W, I, O>(
    reader: &mut R,
    writer: &mut W,
    lines: &mut BoundedLines<I>,
    output: &mut O,
    options: SessionOptions,
    shutdown: &ShutdownSignal,
) -> io::Result<SessionEnd>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            _ = shutdown.wait() => return Ok(SessionEnd::Interrupted),
            inbound = read_chunk(reader, DEFAULT_CHUNK_SIZE) => {
                if !print_inbound(inbound?, output, options.transform).await? {
                    return Ok(SessionEnd::ServerClosed);
                }
            }
            line = lines.next_line() => match line? {
                None => return Ok(SessionEnd::InputClosed),
                Some(line) => match classify(line) {
                    Outbound::Quit => return Ok(SessionEnd::Quit),
                    Outbound::Skip => {}
                    Outbound::Send(text) => send(writer, &text, options.transform).await?,
                },
            },
        }
    }
}

async fn lockstep<R, W, I, O>(
    reader: &mut R,
    writer: &mut W,
    lines: &mut BoundedLines<I>,
    output: &mut O,
    options: SessionOptions,
    shutdown: &ShutdownSignal,
) -> io::Result<SessionEnd>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    loop {
        let text = tokio::select! {
            _ = shutdown.wait() => return Ok(SessionEnd::Interrupted),
            line = lines.next_line() => match line? {
                None => return Ok(SessionEnd::InputClosed),
                Some(line) => match classify(line) {
                    Outbound::Quit => return Ok(SessionEnd::Quit),
                    Outbound::Skip => continue,
                    Outbound::Send(text) => text,
                },
            },
        };
        send(writer, &text, options.transform).await?;

        tokio::select! {
            _ = shutdown.wait() => return Ok(SessionEnd::Interrupted),
            inbound = read_chunk(reader, DEFAULT_CHUNK_SIZE) => {
                if !print_inbound(inbound?, output, options.transform).await? {
                    return Ok(SessionEnd::ServerClosed);
                }
            }
        }
    }
}

async fn send<W: AsyncWrite + Unpin>(
    writer: &mut W,
    text: &[u8],
    transform: WireTransform,
) -> io::Result<()> {
    let wire = transform.encode(text);
    writer.write_all(&wire).await?;
    writer.flush().await
}

/// Prints one inbound chunk. Returns `false` at end of stream.
async fn print_inbound<O: AsyncWrite + Unpin>(
    outcome: ReadOutcome,
    output: &mut O,
    transform: WireTransform,
) -> io::Result<bool> {
    let ReadOutcome::Chunk(mut chunk) = outcome else {
        return Ok(false);
    };
    transform.decode_in_place(&mut chunk);
    let text = String::from_utf8_lossy(&chunk);
    let line = format!("> {}\n", text.trim_end_matches(['\r', '\n']));
    output.write_all(line.as_bytes()).await?;
    output.flush().await?;
    Ok(true)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{duplex as pipe, AsyncReadExt};
    use tokio_test::io::Builder;

    const WAIT: Duration = Duration::from_secs(2);

    fn options(mode: SessionMode) -> SessionOptions {
        SessionOptions {
            mode,
            max_line: 1024,
            transform: WireTransform::Shift,
        }
    }

    fn whole(bytes: &[u8]) -> InputLine {
        InputLine {
            bytes: bytes.to_vec(),
            whole: true,
        }
    }

    #[test]
    fn test_classify_strips_line_endings() {
        assert!(matches!(classify(whole(b"hi\r\n")), Outbound::Send(t) if t == b"hi"));
        assert!(matches!(classify(whole(b"\n")), Outbound::Skip));
        assert!(matches!(classify(whole(b"/quit\n")), Outbound::Quit));
    }

    #[test]
    fn test_classify_sends_quit_text_from_a_split_line() {
        let piece = InputLine {
            bytes: b"/quit".to_vec(),
            whole: false,
        };
        assert!(matches!(classify(piece), Outbound::Send(t) if t == b"/quit"));
    }

    #[tokio::test]
    async fn test_quit_inside_a_long_line_does_not_end_the_session() {
        // Arrange: "/quitXYZ" with a five-byte limit splits into "/quit" and
        // "XYZ"; both go out shifted, each followed by one scripted reply
        let server = Builder::new()
            .write(b"0rvju")
            .read(b"pl")
            .write(b"YZ[")
            .read(b"ij")
            .build();
        let mut output = Vec::new();
        let opts = SessionOptions {
            max_line: 5,
            ..options(SessionMode::Lockstep)
        };

        // Act
        let end = run_session(server, &b"/quitXYZ\n"[..], &mut output, opts, &ShutdownSignal::new())
            .await
            .unwrap();

        // Assert
        assert_eq!(end, SessionEnd::InputClosed);
        assert_eq!(output, b"> ok\n> hi\n");
    }

    #[tokio::test]
    async fn test_lockstep_sends_line_then_prints_one_reply() {
        // Arrange: "hello" goes out shifted, "hi" comes back shifted
        let server = Builder::new().write(b"ifmmp").read(b"ij").build();
        let mut output = Vec::new();

        // Act
        let end = run_session(
            server,
            &b"hello\n"[..],
            &mut output,
            options(SessionMode::Lockstep),
            &ShutdownSignal::new(),
        )
        .await
        .unwrap();

        // Assert
        assert_eq!(end, SessionEnd::InputClosed);
        assert_eq!(output, b"> hi\n");
    }

    #[tokio::test]
    async fn test_lockstep_skips_empty_lines() {
        let server = Builder::new().write(b"b").read(b"d").build();
        let mut output = Vec::new();

        run_session(
            server,
            &b"\n\r\na\n"[..],
            &mut output,
            options(SessionMode::Lockstep),
            &ShutdownSignal::new(),
        )
        .await
        .unwrap();

        assert_eq!(output, b"> c\n");
    }

    #[tokio::test]
    async fn test_quit_sends_nothing() {
        // Arrange: no writes are scripted
        let server = Builder::new().build();
        let mut output = Vec::new();

        // Act
        let end = run_session(
            server,
            &b"/quit\nnever sent\n"[..],
            &mut output,
            options(SessionMode::Lockstep),
            &ShutdownSignal::new(),
        )
        .await
        .unwrap();

        // Assert
        assert_eq!(end, SessionEnd::Quit);
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_long_line_is_sent_in_bounded_writes() {
        // Arrange: five bytes with a three-byte limit go out as two writes,
        // each followed by one scripted reply
        let server = Builder::new()
            .write(b"bcd")
            .read(b"pl")
            .write(b"ef")
            .read(b"ij")
            .build();
        let mut output = Vec::new();
        let opts = SessionOptions {
            max_line: 3,
            ..options(SessionMode::Lockstep)
        };

        // Act
        let end = run_session(server, &b"abcde"[..], &mut output, opts, &ShutdownSignal::new())
            .await
            .unwrap();

        // Assert
        assert_eq!(end, SessionEnd::InputClosed);
        assert_eq!(output, b"> ok\n> hi\n");
    }

    #[tokio::test]
    async fn test_duplex_prints_inbound_and_sends_input() {
        // Arrange
        let (client_side, mut server_side) = pipe(1024);
        let (mut input_tx, input_rx) = pipe(1024);
        let (mut output_tx, mut output_rx) = pipe(1024);
        let shutdown = ShutdownSignal::new();

        let session = tokio::spawn(async move {
            run_session(
                client_side,
                tokio::io::BufReader::new(input_rx),
                &mut output_tx,
                options(SessionMode::Duplex),
                &shutdown,
            )
            .await
            .unwrap()
        });

        // Act: the relay pushes a message, then the user types a line
        server_side.write_all(b"xfmdpnf").await.unwrap();
        let mut printed = [0u8; 10];
        tokio::time::timeout(WAIT, output_rx.read_exact(&mut printed))
            .await
            .unwrap()
            .unwrap();

        input_tx.write_all(b"thanks\n").await.unwrap();
        let mut sent = [0u8; 6];
        tokio::time::timeout(WAIT, server_side.read_exact(&mut sent))
            .await
            .unwrap()
            .unwrap();

        drop(input_tx);
        let end = tokio::time::timeout(WAIT, session).await.unwrap().unwrap();

        // Assert
        assert_eq!(&printed, b"> welcome\n");
        assert_eq!(&sent, b"uibolt");
        assert_eq!(end, SessionEnd::InputClosed);
    }

    #[tokio::test]
    async fn test_duplex_ends_when_server_closes() {
        let (client_side, server_side) = pipe(64);
        let (_input_tx, input_rx) = pipe(64);
        let mut output = Vec::new();
        drop(server_side);

        let end = tokio::time::timeout(
            WAIT,
            run_session(
                client_side,
                tokio::io::BufReader::new(input_rx),
                &mut output,
                options(SessionMode::Duplex),
                &ShutdownSignal::new(),
            ),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(end, SessionEnd::ServerClosed);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_a_waiting_session() {
        let (client_side, _server_side) = pipe(64);
        let (_input_tx, input_rx) = pipe(64);
        let mut output = Vec::new();
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        let end = tokio::time::timeout(
            WAIT,
            run_session(
                client_side,
                tokio::io::BufReader::new(input_rx),
                &mut output,
                options(SessionMode::Duplex),
                &shutdown,
            ),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(end, SessionEnd::Interrupted);
    }

    #[tokio::test]
    async fn test_passthrough_sends_plain_bytes() {
        let server = Builder::new().write(b"plain").read(b"back").build();
        let mut output = Vec::new();
        let opts = SessionOptions {
            transform: WireTransform::Passthrough,
            ..options(SessionMode::Lockstep)
        };

        run_session(server, &b"plain\n"[..], &mut output, opts, &ShutdownSignal::new())
            .await
            .unwrap();

        assert_eq!(output, b"> back\n");
    }
}
