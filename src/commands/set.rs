use std::sync::Arc;

use jiff::Timestamp;
use tokio::sync::RwLock;

use crate::{
    commands::{CommandError, command_handler::CommandResult},
    key_value_store::KeyValueStore,
    resp::RespValue,
};

pub struct SetArguments {
    key: String,
    value: String,
    expiration: Option<Timestamp>,
}

impl SetArguments {
    /// Parses `SET key value [PX milliseconds]`. PX computes an absolute
    /// wall-clock expiry from the current time.
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 2 && arguments.len() != 4 {
            return Err(CommandError::WrongNumberOfArguments("set".to_string()));
        }

        let mut expiration: Option<Timestamp> = None;

        if arguments.len() == 4 {
            if !arguments[2].eq_ignore_ascii_case("px") {
                return Err(CommandError::UnknownSetOption(arguments[2].clone()));
            }

            let milliseconds = arguments[3]
                .parse::<i64>()
                .map_err(|_| CommandError::InvalidExpireTime)?;

            let expiry_ms = Timestamp::now()
                .as_millisecond()
                .checked_add(milliseconds)
                .ok_or(CommandError::InvalidExpireTime)?;

            expiration = Some(
                Timestamp::from_millisecond(expiry_ms)
                    .map_err(|_| CommandError::InvalidExpireTime)?,
            );
        }

        Ok(Self {
            key: arguments[0].clone(),
            value: arguments[1].clone(),
            expiration,
        })
    }
}

pub async fn set(
    store: &Arc<RwLock<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let set_arguments = SetArguments::parse(arguments)?;

    let mut store_guard = store.write().await;
    store_guard.set(
        set_arguments.key,
        set_arguments.value,
        set_arguments.expiration,
    );

    Ok(CommandResult::Response(
        RespValue::SimpleString("OK".to_string()).encode(),
    ))
}
