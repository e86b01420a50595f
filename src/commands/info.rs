use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    commands::{CommandError, command_handler::CommandResult},
    resp::RespValue,
    server::RedisServer,
};

/// INFO with the `replication` section: one bulk string of `key:value`
/// lines. Masters report their propagation offset; replicas additionally
/// name the master they follow.
pub async fn info(
    server: &Arc<RwLock<RedisServer>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let [section] = arguments.as_slice() else {
        return Err(CommandError::WrongNumberOfArguments("info".to_string()));
    };

    if !section.eq_ignore_ascii_case("replication") {
        return Err(CommandError::UnsupportedInfoSection);
    }

    let server_guard = server.read().await;

    Ok(CommandResult::Response(
        RespValue::BulkString(server_guard.replication_info()).encode(),
    ))
}
