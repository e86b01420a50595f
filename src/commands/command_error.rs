use thiserror::Error;

use crate::{key_value_store::StoreError, resp::RespValue};

/// Failures surfaced by command execution. Every variant renders to a RESP
/// error line on the client's connection; none of them close it.
#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("wrong number of arguments for '{0}'")]
    WrongNumberOfArguments(String),
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("invalid command")]
    InvalidCommand,
    #[error("invalid expire time in 'set' command")]
    InvalidExpireTime,
    #[error("unknown SET option '{0}'")]
    UnknownSetOption(String),
    #[error("value is not an integer or out of range")]
    NotInteger,
    #[error("Invalid stream ID format")]
    InvalidStreamId,
    #[error("The ID specified in XADD must be greater than 0-0")]
    StreamIdZero,
    #[error("The ID specified in XADD is equal or smaller than the target stream top item")]
    StreamIdTooSmall,
    #[error("Invalid data type for key")]
    DataTypeMismatch,
    #[error("GET command cannot be used with stream values")]
    GetOnStream,
    #[error("BLOCK timeout is not an integer")]
    BlockNotInteger,
    #[error("Unbalanced XREAD list of streams: for each stream key an ID must be specified.")]
    UnbalancedXread,
    #[error("MULTI calls can not be nested")]
    MultiNested,
    #[error("EXEC without MULTI")]
    ExecWithoutMulti,
    #[error("DISCARD without MULTI")]
    DiscardWithoutMulti,
    #[error("unsupported CONFIG subcommand: {0}")]
    UnsupportedConfigSubcommand(String),
    #[error("unknown CONFIG parameter '{0}'")]
    UnknownConfigParameter(String),
    #[error("invalid glob pattern: {0}")]
    InvalidGlobPattern(String),
    #[error("unsupported INFO section")]
    UnsupportedInfoSection,
    #[error("invalid PSYNC replication ID")]
    InvalidPsyncReplicationId,
    #[error("invalid PSYNC offset")]
    InvalidPsyncOffset,
    #[error("{0} is only available on a master")]
    MasterOnlyCommand(String),
    #[error("write commands not allowed in replica")]
    WriteOnReplica,
}

impl CommandError {
    /// The RESP error line sent to the client.
    pub fn as_string(&self) -> String {
        RespValue::Error(format!("ERR {}", self)).encode()
    }
}

impl From<StoreError> for CommandError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotInteger => CommandError::NotInteger,
            StoreError::StreamIdTooSmall => CommandError::StreamIdTooSmall,
            StoreError::StreamIdZero => CommandError::StreamIdZero,
            StoreError::WrongType => CommandError::DataTypeMismatch,
        }
    }
}
