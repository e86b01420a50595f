use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    commands::{CommandError, command_handler::CommandResult},
    key_value_store::KeyValueStore,
    resp::RespValue,
};

pub async fn type_command(
    store: &Arc<RwLock<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let [key] = arguments.as_slice() else {
        return Err(CommandError::WrongNumberOfArguments("type".to_string()));
    };

    let store_guard = store.read().await;

    Ok(CommandResult::Response(
        RespValue::SimpleString(store_guard.value_type(key).to_string()).encode(),
    ))
}
