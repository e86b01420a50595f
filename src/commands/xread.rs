use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tokio::time::Instant;

use crate::{
    commands::{
        CommandError,
        command_handler::CommandResult,
        stream_utils::{entries_to_resp, parse_read_id},
    },
    key_value_store::KeyValueStore,
    resp::RespValue,
};

#[derive(Debug, PartialEq)]
pub struct XreadArguments {
    /// `None` - return immediately; `Some(0)` - wait indefinitely;
    /// `Some(ms)` - wait up to the deadline
    block_ms: Option<u64>,
    key_id_pairs: Vec<(String, (i64, i64))>,
}

impl XreadArguments {
    /// Parses `XREAD [BLOCK ms] STREAMS key [key ...] id [id ...]`. The
    /// keys and IDs are two parallel halves of the tail; an odd tail means
    /// some stream is missing its ID.
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let mut block_ms: Option<u64> = None;
        let mut cursor = 0;

        while cursor < arguments.len() {
            if arguments[cursor].eq_ignore_ascii_case("block") {
                let value = arguments
                    .get(cursor + 1)
                    .ok_or(CommandError::BlockNotInteger)?;
                block_ms = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| CommandError::BlockNotInteger)?,
                );
                cursor += 2;
            } else if arguments[cursor].eq_ignore_ascii_case("streams") {
                cursor += 1;
                break;
            } else {
                return Err(CommandError::WrongNumberOfArguments("xread".to_string()));
            }
        }

        let tail = &arguments[cursor..];

        if tail.is_empty() {
            return Err(CommandError::WrongNumberOfArguments("xread".to_string()));
        }

        if tail.len() % 2 != 0 {
            return Err(CommandError::UnbalancedXread);
        }

        let split = tail.len() / 2;
        let mut key_id_pairs = Vec::with_capacity(split);

        for i in 0..split {
            key_id_pairs.push((tail[i].clone(), parse_read_id(&tail[split + i])?));
        }

        Ok(Self {
            block_ms,
            key_id_pairs,
        })
    }
}

/// Reads entries strictly newer than the given IDs across one or more
/// streams.
///
/// Without BLOCK, an empty result is the null array. With BLOCK, the reader
/// samples and registers itself as a waiter on every listed stream in one
/// critical section (so no append can slip between the two), then sleeps on
/// its channel outside the lock until an XADD signals it or the deadline
/// passes.
pub async fn xread(
    store: &Arc<RwLock<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let xread_arguments = XreadArguments::parse(arguments)?;

    let deadline = match xread_arguments.block_ms {
        Some(0) => None,
        Some(ms) => Some(Instant::now() + Duration::from_millis(ms)),
        None => None,
    };

    let (sender, mut receiver) = mpsc::channel::<()>(1);

    loop {
        {
            let mut store_guard = store.write().await;

            let results = sample_streams(&store_guard, &xread_arguments.key_id_pairs)?;

            if !results.is_empty() {
                return Ok(CommandResult::Response(encode_results(results)));
            }

            if xread_arguments.block_ms.is_none() {
                return Ok(CommandResult::Response(RespValue::NullArray.encode()));
            }

            for (key, _) in &xread_arguments.key_id_pairs {
                store_guard.register_stream_waiter(key, &sender)?;
            }
        }

        let woken = match deadline {
            None => receiver.recv().await.is_some(),
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());

                if remaining.is_zero() {
                    return Ok(CommandResult::Response(RespValue::NullArray.encode()));
                }

                tokio::time::timeout(remaining, receiver.recv())
                    .await
                    .is_ok()
            }
        };

        if !woken {
            return Ok(CommandResult::Response(RespValue::NullArray.encode()));
        }
    }
}

type StreamResults = Vec<(String, Vec<crate::key_value_store::StreamEntry>)>;

fn sample_streams(
    store: &KeyValueStore,
    key_id_pairs: &[(String, (i64, i64))],
) -> Result<StreamResults, CommandError> {
    let mut results = Vec::new();

    for (key, after) in key_id_pairs {
        let entries = store.entries_after(key, *after)?;

        if !entries.is_empty() {
            results.push((key.clone(), entries));
        }
    }

    Ok(results)
}

fn encode_results(results: StreamResults) -> String {
    RespValue::Array(
        results
            .into_iter()
            .map(|(key, entries)| {
                RespValue::Array(vec![RespValue::BulkString(key), entries_to_resp(&entries)])
            })
            .collect(),
    )
    .encode()
}
