use std::sync::Arc;

use globset::Glob;
use tokio::sync::RwLock;

use crate::{
    commands::{CommandError, command_handler::CommandResult},
    key_value_store::KeyValueStore,
    resp::RespValue,
};

/// Lists the live keys matching a glob pattern. `*` is the pattern that
/// matters in practice; the compiled matcher covers it and friends.
pub async fn keys(
    store: &Arc<RwLock<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let [pattern] = arguments.as_slice() else {
        return Err(CommandError::WrongNumberOfArguments("keys".to_string()));
    };

    let matcher = Glob::new(pattern)
        .map_err(|e| CommandError::InvalidGlobPattern(e.to_string()))?
        .compile_matcher();

    let store_guard = store.read().await;

    let matching: Vec<RespValue> = store_guard
        .keys()
        .into_iter()
        .filter(|key| matcher.is_match(key))
        .map(RespValue::BulkString)
        .collect();

    Ok(CommandResult::Response(
        RespValue::Array(matching).encode(),
    ))
}
