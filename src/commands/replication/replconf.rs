//! REPLCONF on the master side of the handshake.
//!
//! `listening-port` and `capa` exchanges (and any other configuration
//! subcommand) are acknowledged with `+OK`. The GETACK/ACK pair never goes
//! through here: GETACK is answered inside the replica's replication read
//! loop, and incoming ACKs are consumed by the per-replica acknowledgment
//! loop on the master.

use crate::{
    commands::{CommandError, command_handler::CommandResult},
    resp::RespValue,
};

pub fn replconf(arguments: Vec<String>) -> Result<CommandResult, CommandError> {
    if arguments.is_empty() {
        return Err(CommandError::WrongNumberOfArguments("replconf".to_string()));
    }

    Ok(CommandResult::Response(
        RespValue::SimpleString("OK".to_string()).encode(),
    ))
}
