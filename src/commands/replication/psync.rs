use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    commands::{CommandError, command_handler::CommandResult},
    resp::RespValue,
    server::RedisServer,
};

pub struct PsyncArguments {
    replication_id: String,
    offset: i64,
}

impl PsyncArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let [replication_id, offset] = arguments.as_slice() else {
            return Err(CommandError::WrongNumberOfArguments("psync".to_string()));
        };

        let offset = offset
            .parse::<i64>()
            .map_err(|_| CommandError::InvalidPsyncOffset)?;

        Ok(Self {
            replication_id: replication_id.clone(),
            offset,
        })
    }
}

/// Begins full resynchronization for a connecting replica.
///
/// `PSYNC ? -1` (the only form a fresh replica sends) is answered with
/// `+FULLRESYNC <replid> <offset>`; the connection layer follows up with the
/// raw RDB bulk and flips the socket into replica mode. A concrete
/// replication ID is accepted only if it matches this master's own.
pub async fn psync(
    server: &Arc<RwLock<RedisServer>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let psync_arguments = PsyncArguments::parse(arguments)?;

    let server_guard = server.read().await;

    if server_guard.is_replica() {
        return Err(CommandError::MasterOnlyCommand("PSYNC".to_string()));
    }

    if psync_arguments.replication_id != "?"
        && psync_arguments.replication_id != server_guard.repl_id
    {
        return Err(CommandError::InvalidPsyncReplicationId);
    }

    // No backlog, so any requested offset gets a full resynchronization.
    debug!(
        requested_offset = psync_arguments.offset,
        "starting full resync"
    );

    Ok(CommandResult::BeginReplicaSync(
        RespValue::SimpleString(format!(
            "FULLRESYNC {} {}",
            server_guard.repl_id, server_guard.master_offset
        ))
        .encode(),
    ))
}
