use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    commands::{
        CommandError, command_handler::CommandResult, stream_utils::parse_entry_id,
    },
    key_value_store::KeyValueStore,
    resp::RespValue,
};

pub struct XaddArguments {
    key: String,
    /// `-1` in either position means auto-generate
    milliseconds: i64,
    sequence: i64,
    fields: Vec<(String, String)>,
}

impl XaddArguments {
    /// Parses `XADD key id field value [field value ...]`.
    ///
    /// # Returns
    ///
    /// * `Ok(XaddArguments)` - Key, resolved ID request and field pairs in
    ///   the order given
    /// * `Err(CommandError::WrongNumberOfArguments)` - Fewer than four
    ///   arguments or an unpaired field
    /// * `Err(CommandError::InvalidStreamId)` - The ID is not `*`, `ms-*` or
    ///   `ms-seq`
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() < 4 || arguments[2..].len() % 2 != 0 {
            return Err(CommandError::WrongNumberOfArguments("xadd".to_string()));
        }

        let (milliseconds, sequence) = parse_entry_id(&arguments[1])?;

        Ok(Self {
            key: arguments[0].clone(),
            milliseconds,
            sequence,
            fields: arguments[2..]
                .chunks(2)
                .map(|pair| (pair[0].clone(), pair[1].clone()))
                .collect(),
        })
    }
}

/// Appends an entry to a stream, creating the stream on first use, and
/// replies with the (possibly auto-generated) entry ID. Waking any blocked
/// XREAD clients happens inside the store while the write lock is held.
pub async fn xadd(
    store: &Arc<RwLock<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let xadd_arguments = XaddArguments::parse(arguments)?;

    let mut store_guard = store.write().await;

    let id = store_guard.xadd(
        &xadd_arguments.key,
        xadd_arguments.milliseconds,
        xadd_arguments.sequence,
        xadd_arguments.fields,
    )?;

    Ok(CommandResult::Response(RespValue::BulkString(id).encode()))
}
