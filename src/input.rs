//! Buffered reading of RESP frames from a socket, and the replica side of
//! the replication handshake.
//!
//! `FrameReader` accumulates raw bytes in a `BytesMut` and hands out one
//! decoded frame at a time together with the exact byte count it consumed,
//! which the replication read loop feeds into its offset accounting.

use std::sync::Arc;

use bytes::BytesMut;
use regex::Regex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tracing::debug;

use crate::resp::{RespError, RespValue};
use crate::server::RedisServer;

#[derive(Error, Debug, PartialEq)]
pub enum CommandReadError {
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("connection closed mid-frame")]
    UnexpectedEof,
    #[error("RESP parse error")]
    RespParseError(#[from] RespError),
    #[error("invalid response from master")]
    InvalidResponseFromMaster,
}

impl CommandReadError {
    pub fn as_string(&self) -> String {
        match self {
            CommandReadError::RespParseError(err) => err.as_string(),
            other => RespValue::Error(format!("ERR {}", other)).encode(),
        }
    }

    /// Whether the connection can keep serving after this error. Framing
    /// errors and EOFs are fatal; everything else is reported to the client
    /// on the open connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CommandReadError::IoError(_)
                | CommandReadError::ConnectionClosed
                | CommandReadError::UnexpectedEof
                | CommandReadError::RespParseError(_)
        )
    }
}

/// Reads RESP frames from an async byte stream, buffering partial frames
/// between reads.
pub struct FrameReader<R> {
    reader: R,
    buffer: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// The underlying stream, for callers that also write on it (the replica
    /// handshake and ACK replies). The read buffer is untouched.
    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Reads one complete frame.
    ///
    /// # Returns
    ///
    /// * `Ok((frame, consumed))` - The decoded frame and the exact number of
    ///   bytes it occupied on the wire
    /// * `Err(CommandReadError::ConnectionClosed)` - EOF between frames
    /// * `Err(CommandReadError::UnexpectedEof)` - EOF with a partial frame
    ///   buffered
    /// * `Err(CommandReadError::RespParseError)` - Malformed framing
    pub async fn read_frame(&mut self) -> Result<(RespValue, usize), CommandReadError> {
        loop {
            if let Some((frame, consumed)) = RespValue::parse(&self.buffer)? {
                let _ = self.buffer.split_to(consumed);
                return Ok((frame, consumed));
            }

            self.fill_buffer().await?;
        }
    }

    /// Reads the raw length-prefixed bulk carrying the RDB snapshot after
    /// FULLRESYNC: `$<len>\r\n` followed by exactly `len` bytes and, unlike a
    /// bulk string, no trailing CRLF.
    pub async fn read_rdb_payload(&mut self) -> Result<Vec<u8>, CommandReadError> {
        let length = loop {
            if let Some(position) = self.buffer.windows(2).position(|window| window == b"\r\n") {
                let line = std::str::from_utf8(&self.buffer[..position])
                    .map_err(|_| RespError::InvalidUtf8)?;

                let length = line
                    .strip_prefix('$')
                    .and_then(|digits| digits.parse::<usize>().ok())
                    .ok_or(CommandReadError::InvalidResponseFromMaster)?;

                let _ = self.buffer.split_to(position + 2);
                break length;
            }

            self.fill_buffer().await?;
        };

        while self.buffer.len() < length {
            self.fill_buffer().await?;
        }

        Ok(self.buffer.split_to(length).to_vec())
    }

    async fn fill_buffer(&mut self) -> Result<(), CommandReadError> {
        let mut chunk = [0u8; 4096];

        let bytes_read = self
            .reader
            .read(&mut chunk)
            .await
            .map_err(|e| CommandReadError::IoError(e.to_string()))?;

        if bytes_read == 0 {
            if self.buffer.is_empty() {
                return Err(CommandReadError::ConnectionClosed);
            }
            return Err(CommandReadError::UnexpectedEof);
        }

        self.buffer.extend_from_slice(&chunk[..bytes_read]);

        Ok(())
    }
}

/// Performs the replica side of the replication handshake on a freshly
/// opened connection to the master:
///
/// 1. `PING` → `+PONG`
/// 2. `REPLCONF listening-port <port>` → `+OK`
/// 3. `REPLCONF capa psync2` → `+OK`
/// 4. `PSYNC ? -1` → `+FULLRESYNC <replid> <offset>`
/// 5. the raw RDB payload, which this implementation discards
pub async fn handshake(
    reader: &mut FrameReader<TcpStream>,
    server: &Arc<RwLock<RedisServer>>,
) -> Result<(), CommandReadError> {
    let response = send_handshake_command(reader, RespValue::command(&["PING"])).await?;

    if response != RespValue::SimpleString("PONG".to_string()) {
        return Err(CommandReadError::InvalidResponseFromMaster);
    }

    let listening_port = {
        let server_guard = server.read().await;
        server_guard.port.to_string()
    };

    let response = send_handshake_command(
        reader,
        RespValue::command(&["REPLCONF", "listening-port", &listening_port]),
    )
    .await?;

    if response != RespValue::SimpleString("OK".to_string()) {
        return Err(CommandReadError::InvalidResponseFromMaster);
    }

    let response =
        send_handshake_command(reader, RespValue::command(&["REPLCONF", "capa", "psync2"])).await?;

    if response != RespValue::SimpleString("OK".to_string()) {
        return Err(CommandReadError::InvalidResponseFromMaster);
    }

    let response = send_handshake_command(reader, RespValue::command(&["PSYNC", "?", "-1"])).await?;

    let RespValue::SimpleString(fullresync) = response else {
        return Err(CommandReadError::InvalidResponseFromMaster);
    };

    validate_fullresync(&fullresync)?;

    let payload = reader.read_rdb_payload().await?;
    debug!(bytes = payload.len(), "discarded initial RDB snapshot");

    Ok(())
}

fn validate_fullresync(response: &str) -> Result<(), CommandReadError> {
    let parts: Vec<&str> = response.split_whitespace().collect();

    if parts.len() != 3 || parts[0] != "FULLRESYNC" {
        return Err(CommandReadError::InvalidResponseFromMaster);
    }

    let repl_id_regex = Regex::new(r"^[a-zA-Z0-9]{40}$").unwrap();

    if !repl_id_regex.is_match(parts[1]) || parts[2].parse::<i64>().is_err() {
        return Err(CommandReadError::InvalidResponseFromMaster);
    }

    Ok(())
}

async fn send_handshake_command(
    reader: &mut FrameReader<TcpStream>,
    command: RespValue,
) -> Result<RespValue, CommandReadError> {
    let stream = reader.inner_mut();

    stream
        .write_all(command.encode().as_bytes())
        .await
        .map_err(|e| CommandReadError::IoError(e.to_string()))?;
    stream
        .flush()
        .await
        .map_err(|e| CommandReadError::IoError(e.to_string()))?;

    let (response, _) = reader.read_frame().await?;

    Ok(response)
}
