use crate::{
    commands::{CommandError, command_handler::CommandResult},
    resp::RespValue,
};

pub fn echo(arguments: Vec<String>) -> Result<CommandResult, CommandError> {
    let [message] = arguments.as_slice() else {
        return Err(CommandError::WrongNumberOfArguments("echo".to_string()));
    };

    Ok(CommandResult::Response(
        RespValue::BulkString(message.clone()).encode(),
    ))
}
