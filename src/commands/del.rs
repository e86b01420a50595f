use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    commands::{CommandError, command_handler::CommandResult},
    key_value_store::KeyValueStore,
    resp::RespValue,
};

/// Deletes each named key and replies with the number of keys that were
/// actually present (expired entries do not count).
pub async fn del(
    store: &Arc<RwLock<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    if arguments.is_empty() {
        return Err(CommandError::WrongNumberOfArguments("del".to_string()));
    }

    let mut store_guard = store.write().await;
    let mut removed = 0;

    for key in &arguments {
        if store_guard.remove(key) {
            removed += 1;
        }
    }

    Ok(CommandResult::Response(
        RespValue::Integer(removed).encode(),
    ))
}
