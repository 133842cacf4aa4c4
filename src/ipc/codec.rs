//! Node IPC wire codec
//!
//! Ethereum nodes exchange bare JSON documents over the socket, with no
//! length prefix or header:
//! ```text
//! {"jsonrpc":"2.0","id":1,"result":"0x1"}\n[{"jsonrpc":"2.0",...},...]
//! ```
//! Outgoing messages are terminated with a newline. Incoming bytes are
//! buffered until they form a complete JSON value.

use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::common::{Error, Result};

/// Default maximum size of one buffered message (10 MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Write one JSON message to the stream
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, json: &[u8]) -> Result<()> {
    writer.write_all(json).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Splits a byte stream into complete JSON values
///
/// Bytes are scanned once as they arrive, tracking nesting depth and
/// string state; a value is handed to serde only once its closing bracket
/// has been seen. Top-level values must be objects or arrays.
#[derive(Debug)]
pub struct JsonStreamDecoder {
    buf: Vec<u8>,
    max_message_size: usize,
    /// Bytes of `buf` already scanned
    scanned: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl JsonStreamDecoder {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_message_size,
            scanned: 0,
            depth: 0,
            in_string: false,
            escaped: false,
        }
    }

    /// Append bytes read from the stream
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of bytes waiting to form a value
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Take the next complete value, if one is buffered
    ///
    /// Returns `Ok(None)` when more bytes are needed. Malformed input and
    /// oversize messages are errors; the stream can't be resynchronized
    /// after either.
    pub fn next_value(&mut self) -> Result<Option<Value>> {
        match self.scan()? {
            Some(end) => {
                let value = serde_json::from_slice(&self.buf[..end])
                    .map_err(|e| Error::Protocol(format!("Invalid JSON from node: {}", e)));
                self.buf.drain(..end);
                self.scanned = 0;
                value.map(Some)
            }
            None => {
                if self.depth == 0 {
                    // Only whitespace between values so far
                    self.buf.clear();
                    self.scanned = 0;
                } else if self.buf.len() > self.max_message_size {
                    return Err(Error::Protocol(format!(
                        "Message too large: more than {} bytes buffered",
                        self.max_message_size
                    )));
                }
                Ok(None)
            }
        }
    }

    /// Scan unseen bytes; returns the end offset of a complete value
    fn scan(&mut self) -> Result<Option<usize>> {
        while self.scanned < self.buf.len() {
            let byte = self.buf[self.scanned];
            self.scanned += 1;

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' if self.depth > 0 => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        return Ok(Some(self.scanned));
                    }
                }
                b'"' if self.depth > 0 => self.in_string = true,
                b if b.is_ascii_whitespace() => {}
                b if self.depth == 0 => {
                    return Err(Error::Protocol(format!(
                        "Invalid JSON from node: unexpected byte 0x{:02x} between messages",
                        b
                    )));
                }
                _ => {}
            }
        }
        Ok(None)
    }
}

impl Default for JsonStreamDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}
