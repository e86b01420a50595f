use std::collections::HashMap;

use jiff::Timestamp;

use crate::{
    key_value_store::{DataType, Value},
    rdb::length::{read_byte, read_length, read_string, take},
};

const EXPIRY_MILLISECONDS_OPCODE: u8 = 0xFC;
const EXPIRY_SECONDS_OPCODE: u8 = 0xFD;
const DATABASE_SELECTOR_OPCODE: u8 = 0xFE;
const RESIZE_DB_OPCODE: u8 = 0xFB;
const END_OF_FILE_OPCODE: u8 = 0xFF;
const STRING_VALUE_TYPE: u8 = 0x00;

/// Parses an RDB snapshot into the keyspace entries it describes.
///
/// The loader understands the subset of the format a fresh server needs:
/// the `REDIS<version>` header, the database selector preamble, string
/// values, and optional second/millisecond expiries. Any other value type
/// aborts the parse, which in turn aborts startup.
#[derive(Debug)]
pub struct RdbLoader<'a> {
    buffer: &'a [u8],
    cursor: usize,
}

impl<'a> RdbLoader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, cursor: 0 }
    }

    /// Runs the full parse and returns the decoded key/value entries.
    ///
    /// # Returns
    ///
    /// * `Ok(HashMap<String, Value>)` - All string records, with expiries attached
    /// * `Err(tokio::io::Error)` - Malformed header, truncated data, or an
    ///   unsupported value type
    pub fn parse(mut self) -> tokio::io::Result<HashMap<String, Value>> {
        self.parse_header()?;
        self.skip_to_database_selector()?;

        // Database index, then the hash-table size hints behind 0xFB. The
        // sizes are only read for validation; the map grows on its own.
        read_byte(self.buffer, &mut self.cursor)?;

        if read_byte(self.buffer, &mut self.cursor)? != RESIZE_DB_OPCODE {
            return Err(tokio::io::Error::new(
                tokio::io::ErrorKind::InvalidData,
                "expected resize-db opcode after database selector",
            ));
        }

        read_length(self.buffer, &mut self.cursor)?;
        read_length(self.buffer, &mut self.cursor)?;

        self.parse_records()
    }

    fn parse_header(&mut self) -> tokio::io::Result<()> {
        let header = take(self.buffer, &mut self.cursor, 9)?;

        if &header[..5] != b"REDIS" {
            return Err(tokio::io::Error::new(
                tokio::io::ErrorKind::InvalidData,
                "missing REDIS magic string",
            ));
        }

        if !header[5..].iter().all(u8::is_ascii_digit) {
            return Err(tokio::io::Error::new(
                tokio::io::ErrorKind::InvalidData,
                "RDB version is not numeric",
            ));
        }

        Ok(())
    }

    /// Scans past the auxiliary metadata fields to the `0xFE` database
    /// selector.
    fn skip_to_database_selector(&mut self) -> tokio::io::Result<()> {
        while read_byte(self.buffer, &mut self.cursor)? != DATABASE_SELECTOR_OPCODE {}

        Ok(())
    }

    fn parse_records(&mut self) -> tokio::io::Result<HashMap<String, Value>> {
        let mut entries = HashMap::new();

        loop {
            let mut opcode = read_byte(self.buffer, &mut self.cursor)?;
            let mut expiration: Option<Timestamp> = None;

            match opcode {
                END_OF_FILE_OPCODE => break,
                EXPIRY_MILLISECONDS_OPCODE => {
                    let milliseconds = self.read_little_endian_u64(8)?;
                    expiration = Some(timestamp_from_milliseconds(milliseconds as i64)?);
                    opcode = read_byte(self.buffer, &mut self.cursor)?;
                }
                EXPIRY_SECONDS_OPCODE => {
                    let seconds = self.read_little_endian_u64(4)?;
                    expiration = Some(timestamp_from_milliseconds(seconds as i64 * 1000)?);
                    opcode = read_byte(self.buffer, &mut self.cursor)?;
                }
                _ => {}
            }

            if opcode != STRING_VALUE_TYPE {
                return Err(tokio::io::Error::new(
                    tokio::io::ErrorKind::Unsupported,
                    format!("unsupported RDB value type: 0x{:02X}", opcode),
                ));
            }

            let key = read_string(self.buffer, &mut self.cursor)?;
            let value = read_string(self.buffer, &mut self.cursor)?;

            entries.insert(
                key,
                Value {
                    data: DataType::String(value),
                    expiration,
                },
            );
        }

        Ok(entries)
    }

    fn read_little_endian_u64(&mut self, width: usize) -> tokio::io::Result<u64> {
        let slice = take(self.buffer, &mut self.cursor, width)?;
        let mut padded = [0u8; 8];
        padded[..width].copy_from_slice(slice);

        Ok(u64::from_le_bytes(padded))
    }
}

fn timestamp_from_milliseconds(milliseconds: i64) -> tokio::io::Result<Timestamp> {
    Timestamp::from_millisecond(milliseconds).map_err(|e| {
        tokio::io::Error::new(
            tokio::io::ErrorKind::InvalidData,
            format!("invalid expiry timestamp: {}", e),
        )
    })
}
