use crate::{
    commands::{CommandError, command_handler::CommandResult},
    resp::RespValue,
};

pub fn ping(arguments: Vec<String>) -> Result<CommandResult, CommandError> {
    if !arguments.is_empty() {
        return Err(CommandError::WrongNumberOfArguments("ping".to_string()));
    }

    Ok(CommandResult::Response(
        RespValue::SimpleString("PONG".to_string()).encode(),
    ))
}
