//! Parsing of stream entry IDs and RESP rendering of stream entries, shared
//! by XADD, XRANGE and XREAD.

use crate::{
    commands::command_error::CommandError,
    key_value_store::StreamEntry,
    resp::RespValue,
};

/// Parses an XADD entry ID. `*` requests full auto-generation, `<ms>-*`
/// auto-generates only the sequence; `-1` stands in for "auto" in the
/// returned pair.
pub fn parse_entry_id(argument: &str) -> Result<(i64, i64), CommandError> {
    if argument == "*" {
        return Ok((-1, -1));
    }

    let (ms_part, seq_part) = split_id(argument)?;
    let milliseconds = parse_id_number(ms_part)?;

    let sequence = match seq_part {
        Some("*") => -1,
        Some(part) => parse_id_number(part)?,
        None => return Err(CommandError::InvalidStreamId),
    };

    Ok((milliseconds, sequence))
}

/// Parses the start bound of XRANGE: `-` is the minimum ID and a missing
/// sequence defaults to 0.
pub fn parse_range_start(argument: &str) -> Result<(i64, i64), CommandError> {
    if argument == "-" {
        return Ok((0, 0));
    }

    let (ms_part, seq_part) = split_id(argument)?;
    let milliseconds = parse_id_number(ms_part)?;

    match seq_part {
        Some(part) => Ok((milliseconds, parse_id_number(part)?)),
        None => Ok((milliseconds, 0)),
    }
}

/// Parses the end bound of XRANGE: `+` is unbounded and a missing sequence
/// covers every entry at that timestamp.
pub fn parse_range_end(argument: &str) -> Result<(i64, i64), CommandError> {
    if argument == "+" {
        return Ok((i64::MAX, i64::MAX));
    }

    let (ms_part, seq_part) = split_id(argument)?;
    let milliseconds = parse_id_number(ms_part)?;

    match seq_part {
        Some(part) => Ok((milliseconds, parse_id_number(part)?)),
        None => Ok((milliseconds, i64::MAX)),
    }
}

/// Parses an XREAD position; entries strictly greater than it are returned.
/// A missing sequence defaults to 0.
pub fn parse_read_id(argument: &str) -> Result<(i64, i64), CommandError> {
    let (ms_part, seq_part) = split_id(argument)?;
    let milliseconds = parse_id_number(ms_part)?;

    match seq_part {
        Some(part) => Ok((milliseconds, parse_id_number(part)?)),
        None => Ok((milliseconds, 0)),
    }
}

fn split_id(argument: &str) -> Result<(&str, Option<&str>), CommandError> {
    let parts: Vec<&str> = argument.split('-').collect();

    match parts.as_slice() {
        [ms] => Ok((ms, None)),
        [ms, seq] => Ok((ms, Some(seq))),
        _ => Err(CommandError::InvalidStreamId),
    }
}

fn parse_id_number(part: &str) -> Result<i64, CommandError> {
    let value = part
        .parse::<i64>()
        .map_err(|_| CommandError::InvalidStreamId)?;

    if value < 0 {
        return Err(CommandError::InvalidStreamId);
    }

    Ok(value)
}

/// Renders stream entries as the nested RESP array shape XRANGE and XREAD
/// share: each entry is `[id, [field, value, ...]]` with fields flattened in
/// insertion order.
pub fn entries_to_resp(entries: &[StreamEntry]) -> RespValue {
    RespValue::Array(
        entries
            .iter()
            .map(|entry| {
                let mut flattened = Vec::with_capacity(entry.fields.len() * 2);

                for (field, value) in &entry.fields {
                    flattened.push(RespValue::BulkString(field.clone()));
                    flattened.push(RespValue::BulkString(value.clone()));
                }

                RespValue::Array(vec![
                    RespValue::BulkString(entry.id_string()),
                    RespValue::Array(flattened),
                ])
            })
            .collect(),
    )
}
