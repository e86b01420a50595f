use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    commands::{
        CommandError,
        command_handler::CommandResult,
        stream_utils::{entries_to_resp, parse_range_end, parse_range_start},
    },
    key_value_store::KeyValueStore,
};

pub struct XrangeArguments {
    key: String,
    start: (i64, i64),
    end: (i64, i64),
}

impl XrangeArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let [key, start, end] = arguments.as_slice() else {
            return Err(CommandError::WrongNumberOfArguments("xrange".to_string()));
        };

        Ok(Self {
            key: key.clone(),
            start: parse_range_start(start)?,
            end: parse_range_end(end)?,
        })
    }
}

/// Entries within the closed `[start, end]` interval, in insertion order.
/// The interval check compares `(ms, seq)` pairs lexicographically.
pub async fn xrange(
    store: &Arc<RwLock<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let xrange_arguments = XrangeArguments::parse(arguments)?;

    let store_guard = store.read().await;

    let entries = store_guard.xrange(
        &xrange_arguments.key,
        xrange_arguments.start,
        xrange_arguments.end,
    )?;

    Ok(CommandResult::Response(entries_to_resp(&entries).encode()))
}
