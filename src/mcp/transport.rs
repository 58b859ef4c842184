//! Newline-delimited JSON transport.
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from client
//! - stdout: sends messages to client
//! - stderr: may be used for logging (not MCP messages)
//!
//! The reader and writer halves are generic so the serving loop can run over
//! stdio or an in-memory pipe.

use std::io;
use std::str::Utf8Error;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};

/// One inbound line, without its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// A UTF-8 line.
    Text(String),
    /// A line whose bytes are not UTF-8. The connection stays usable.
    NotUtf8(Utf8Error),
}

/// Reads newline-delimited messages.
#[derive(Debug)]
pub struct LineReader<R> {
    reader: R,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    /// Wraps a buffered reader.
    pub const fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads the next line.
    ///
    /// Returns `None` at EOF.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn read_line(&mut self) -> io::Result<Option<Line>> {
        let mut bytes = Vec::new();
        if self.reader.read_until(b'\n', &mut bytes).await? == 0 {
            return Ok(None);
        }

        if bytes.last() == Some(&b'\n') {
            bytes.pop();
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
        }

        Ok(Some(match String::from_utf8(bytes) {
            Ok(text) => Line::Text(text),
            Err(e) => Line::NotUtf8(e.utf8_error()),
        }))
    }
}

/// Writes newline-delimited messages.
#[derive(Debug)]
pub struct LineWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    /// Wraps a writer.
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes one serialised message followed by a newline, then flushes.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub async fn write_line(&mut self, json: &str) -> io::Result<()> {
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    /// Serialises `message` and writes it.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> io::Result<()> {
        let json = to_line(message)?;
        self.write_line(&json).await
    }
}

/// Serialises a message to a single line.
///
/// # Errors
///
/// Returns `InvalidData` if serialisation fails.
pub fn to_line<T: Serialize>(message: &T) -> io::Result<String> {
    serde_json::to_string(message).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Reader and writer bound to the process's stdin and stdout.
#[must_use]
pub fn stdio() -> (LineReader<BufReader<Stdin>>, LineWriter<Stdout>) {
    (
        LineReader::new(BufReader::new(tokio::io::stdin())),
        LineWriter::new(tokio::io::stdout()),
    )
}
