//! RESP (Redis Serialization Protocol) frame encoding and decoding.
//!
//! The decoder works on a raw byte buffer and reports the exact number of
//! bytes each frame consumed, framing included. That byte count is the unit
//! of replication offset accounting: a master advances its offset by the
//! encoded length of every propagated command, and a replica advances its
//! offset by the bytes it consumed to decode each command from the master.

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum RespError {
    #[error("invalid UTF-8 sequence")]
    InvalidUtf8,
    #[error("unknown RESP type byte '{0}'")]
    UnknownRespType(char),
    #[error("invalid integer")]
    InvalidInteger,
    #[error("invalid length prefix")]
    InvalidLengthPrefix,
    #[error("invalid bulk string")]
    InvalidBulkString,
}

impl RespError {
    pub fn as_string(&self) -> String {
        RespValue::Error(format!("ERR Protocol error: {}", self)).encode()
    }
}

/// A single RESP value as it appears on the wire.
///
/// Commands travel as arrays of bulk strings; replies use the full range of
/// types. The null variants encode the `$-1`/`*-1` markers Redis uses for
/// missing values and timed-out blocking reads.
#[derive(Debug, PartialEq, Clone)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(String),
    NullBulkString,
    Array(Vec<RespValue>),
    NullArray,
}

impl RespValue {
    /// Builds the RESP array of bulk strings for a command, preserving the
    /// arguments verbatim (including case). Used for the replica handshake
    /// and for propagating writes to replicas.
    pub fn command(args: &[&str]) -> Self {
        RespValue::Array(
            args.iter()
                .map(|arg| RespValue::BulkString(arg.to_string()))
                .collect(),
        )
    }

    /// Encodes this value into its wire representation.
    pub fn encode(&self) -> String {
        match self {
            RespValue::SimpleString(s) => format!("+{}\r\n", s),
            RespValue::Error(s) => format!("-{}\r\n", s),
            RespValue::Integer(n) => format!(":{}\r\n", n),
            RespValue::BulkString(s) => format!("${}\r\n{}\r\n", s.len(), s),
            RespValue::NullBulkString => "$-1\r\n".to_string(),
            RespValue::Array(elements) => {
                let mut encoded = format!("*{}\r\n", elements.len());
                for element in elements {
                    encoded.push_str(&element.encode());
                }
                encoded
            }
            RespValue::NullArray => "*-1\r\n".to_string(),
        }
    }

    /// Attempts to decode one complete frame from the start of `buffer`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((value, consumed)))` - One frame decoded; `consumed` is the
    ///   exact number of bytes it occupied, framing bytes included
    /// * `Ok(None)` - The buffer holds only a prefix of a frame; read more
    /// * `Err(RespError)` - The buffer cannot be the prefix of any valid
    ///   frame; the connection should be dropped
    pub fn parse(buffer: &[u8]) -> Result<Option<(RespValue, usize)>, RespError> {
        let mut cursor = 0;

        match decode_value(buffer, &mut cursor)? {
            Some(value) => Ok(Some((value, cursor))),
            None => Ok(None),
        }
    }
}

/// Reads one `\r\n`-terminated line starting at the cursor and advances the
/// cursor past the terminator. Returns `None` if the terminator has not
/// arrived yet.
fn read_line<'a>(buffer: &'a [u8], cursor: &mut usize) -> Result<Option<&'a str>, RespError> {
    let start = *cursor;

    let Some(position) = buffer[start..]
        .windows(2)
        .position(|window| window == b"\r\n")
    else {
        return Ok(None);
    };

    let line = std::str::from_utf8(&buffer[start..start + position])
        .map_err(|_| RespError::InvalidUtf8)?;
    *cursor = start + position + 2;

    Ok(Some(line))
}

fn decode_value(buffer: &[u8], cursor: &mut usize) -> Result<Option<RespValue>, RespError> {
    let start = *cursor;

    let Some(line) = read_line(buffer, cursor)? else {
        return Ok(None);
    };

    let Some(type_byte) = line.chars().next() else {
        return Err(RespError::UnknownRespType('\r'));
    };

    match type_byte {
        '+' => Ok(Some(RespValue::SimpleString(line[1..].to_string()))),
        '-' => Ok(Some(RespValue::Error(line[1..].to_string()))),
        ':' => {
            let value = line[1..]
                .parse::<i64>()
                .map_err(|_| RespError::InvalidInteger)?;
            Ok(Some(RespValue::Integer(value)))
        }
        '$' => decode_bulk_string(buffer, cursor, &line[1..], start),
        '*' => decode_array(buffer, cursor, &line[1..], start),
        other => Err(RespError::UnknownRespType(other)),
    }
}

fn decode_bulk_string(
    buffer: &[u8],
    cursor: &mut usize,
    length_prefix: &str,
    frame_start: usize,
) -> Result<Option<RespValue>, RespError> {
    let length = length_prefix
        .parse::<i64>()
        .map_err(|_| RespError::InvalidLengthPrefix)?;

    if length == -1 {
        return Ok(Some(RespValue::NullBulkString));
    }

    if length < 0 {
        return Err(RespError::InvalidLengthPrefix);
    }

    let length = length as usize;

    if buffer.len() < *cursor + length + 2 {
        *cursor = frame_start;
        return Ok(None);
    }

    let content = std::str::from_utf8(&buffer[*cursor..*cursor + length])
        .map_err(|_| RespError::InvalidUtf8)?;

    if &buffer[*cursor + length..*cursor + length + 2] != b"\r\n" {
        return Err(RespError::InvalidBulkString);
    }

    *cursor += length + 2;

    Ok(Some(RespValue::BulkString(content.to_string())))
}

fn decode_array(
    buffer: &[u8],
    cursor: &mut usize,
    length_prefix: &str,
    frame_start: usize,
) -> Result<Option<RespValue>, RespError> {
    let length = length_prefix
        .parse::<i64>()
        .map_err(|_| RespError::InvalidLengthPrefix)?;

    if length == -1 {
        return Ok(Some(RespValue::NullArray));
    }

    if length < 0 {
        return Err(RespError::InvalidLengthPrefix);
    }

    // Capacity comes from the wire, so let the vector grow on its own.
    let mut elements = Vec::new();

    for _ in 0..length {
        match decode_value(buffer, cursor)? {
            Some(element) => elements.push(element),
            None => {
                *cursor = frame_start;
                return Ok(None);
            }
        }
    }

    Ok(Some(RespValue::Array(elements)))
}
