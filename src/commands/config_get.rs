use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    commands::{CommandError, command_handler::CommandResult},
    resp::RespValue,
    server::RedisServer,
};

pub struct ConfigGetArguments {
    parameters: Vec<String>,
}

impl ConfigGetArguments {
    /// Only the GET subcommand is supported; it takes one or more parameter
    /// names.
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let Some((subcommand, parameters)) = arguments.split_first() else {
            return Err(CommandError::WrongNumberOfArguments("config".to_string()));
        };

        if !subcommand.eq_ignore_ascii_case("get") {
            return Err(CommandError::UnsupportedConfigSubcommand(
                subcommand.to_uppercase(),
            ));
        }

        if parameters.is_empty() {
            return Err(CommandError::WrongNumberOfArguments(
                "config get".to_string(),
            ));
        }

        Ok(Self {
            parameters: parameters.to_vec(),
        })
    }
}

/// Replies with a flat array of `name, value` pairs for the recognized
/// parameters: `dir` and `dbfilename`.
pub async fn config_get(
    server: &Arc<RwLock<RedisServer>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let config_arguments = ConfigGetArguments::parse(arguments)?;

    let server_guard = server.read().await;
    let mut response = Vec::with_capacity(config_arguments.parameters.len() * 2);

    for parameter in &config_arguments.parameters {
        let value = match parameter.as_str() {
            "dir" => server_guard.rdb_directory.clone(),
            "dbfilename" => server_guard.rdb_filename.clone(),
            unknown => {
                return Err(CommandError::UnknownConfigParameter(unknown.to_string()));
            }
        };

        response.push(RespValue::BulkString(parameter.clone()));
        response.push(RespValue::BulkString(value));
    }

    Ok(CommandResult::Response(
        RespValue::Array(response).encode(),
    ))
}
