use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    commands::{CommandError, command_handler::CommandResult},
    key_value_store::{DataType, KeyValueStore},
    resp::RespValue,
};

/// GET is the designated lazy evictor: it takes the exclusive side of the
/// lock so a read that observes an expired key can remove it on the spot.
pub async fn get(
    store: &Arc<RwLock<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let [key] = arguments.as_slice() else {
        return Err(CommandError::WrongNumberOfArguments("get".to_string()));
    };

    let mut store_guard = store.write().await;

    match store_guard.get(key) {
        Some(value) => match value.data {
            DataType::String(ref s) => Ok(CommandResult::Response(
                RespValue::BulkString(s.clone()).encode(),
            )),
            DataType::Stream(_) => Err(CommandError::GetOnStream),
        },
        None => Ok(CommandResult::Response(RespValue::NullBulkString.encode())),
    }
}
