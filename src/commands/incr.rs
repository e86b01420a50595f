use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    commands::{CommandError, command_handler::CommandResult},
    key_value_store::KeyValueStore,
    resp::RespValue,
};

pub async fn incr(
    store: &Arc<RwLock<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let [key] = arguments.as_slice() else {
        return Err(CommandError::WrongNumberOfArguments("incr".to_string()));
    };

    let mut store_guard = store.write().await;
    let incremented = store_guard.incr(key)?;

    Ok(CommandResult::Response(
        RespValue::Integer(incremented).encode(),
    ))
}
