use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    commands::{
        command_error::CommandError,
        config_get::config_get,
        del::del,
        echo::echo,
        get::get,
        incr::incr,
        info::info,
        keys::keys,
        ping::ping,
        replication::{psync, replconf, wait},
        set::set,
        type_command::type_command,
        xadd::xadd,
        xrange::xrange,
        xread::xread,
    },
    key_value_store::KeyValueStore,
    resp::RespValue,
    server::RedisServer,
};

/// What a dispatched command asks the connection layer to do next.
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Send this encoded reply (the normal case)
    Response(String),
    /// Send this FULLRESYNC reply, transfer the snapshot, and treat the
    /// socket as a replica from now on
    BeginReplicaSync(String),
}

/// A parsed command: uppercased name, its arguments, and the original frame
/// (kept verbatim for propagation to replicas).
#[derive(Debug, PartialEq, Clone)]
pub struct CommandHandler {
    pub name: String,
    pub arguments: Vec<String>,
    pub input: RespValue,
}

impl CommandHandler {
    /// Builds a command from a decoded RESP frame, which must be an array of
    /// bulk strings with the command name first.
    pub fn new(input: &RespValue) -> Result<Self, CommandError> {
        let RespValue::Array(elements) = input else {
            return Err(CommandError::InvalidCommand);
        };

        let name = match elements.first() {
            Some(RespValue::BulkString(s)) => s.to_uppercase(),
            _ => return Err(CommandError::InvalidCommand),
        };

        let mut arguments = Vec::with_capacity(elements.len().saturating_sub(1));

        for element in &elements[1..] {
            let RespValue::BulkString(argument) = element else {
                return Err(CommandError::InvalidCommand);
            };
            arguments.push(argument.clone());
        }

        Ok(Self {
            name,
            arguments,
            input: input.clone(),
        })
    }

    /// Dispatches to the command implementation.
    ///
    /// MULTI, EXEC and DISCARD never reach this point: they manipulate
    /// connection-owned transaction state and are intercepted by the
    /// connection loop itself.
    pub async fn execute(
        &self,
        server: &Arc<RwLock<RedisServer>>,
        store: &Arc<RwLock<KeyValueStore>>,
    ) -> Result<CommandResult, CommandError> {
        match self.name.as_str() {
            "PING" => ping(self.arguments.clone()),
            "ECHO" => echo(self.arguments.clone()),
            "SET" => set(store, self.arguments.clone()).await,
            "GET" => get(store, self.arguments.clone()).await,
            "DEL" => del(store, self.arguments.clone()).await,
            "KEYS" => keys(store, self.arguments.clone()).await,
            "TYPE" => type_command(store, self.arguments.clone()).await,
            "INCR" => incr(store, self.arguments.clone()).await,
            "CONFIG" => config_get(server, self.arguments.clone()).await,
            "INFO" => info(server, self.arguments.clone()).await,
            "XADD" => xadd(store, self.arguments.clone()).await,
            "XRANGE" => xrange(store, self.arguments.clone()).await,
            "XREAD" => xread(store, self.arguments.clone()).await,
            "REPLCONF" => replconf(self.arguments.clone()),
            "PSYNC" => psync(server, self.arguments.clone()).await,
            "WAIT" => wait(server, self.arguments.clone()).await,
            _ => Err(CommandError::UnknownCommand(self.name.clone())),
        }
    }

    /// Executes the command and, when it is a successful write on a master,
    /// fans the original frame out to the replicas. Errors are rendered as
    /// RESP error lines; either way the return value is what goes on the
    /// wire.
    pub async fn execute_and_propagate(
        &self,
        server: &Arc<RwLock<RedisServer>>,
        store: &Arc<RwLock<KeyValueStore>>,
    ) -> String {
        match self.execute(server, store).await {
            Ok(CommandResult::Response(reply)) => {
                let should_propagate = {
                    let server_guard = server.read().await;
                    !server_guard.is_replica() && server_guard.is_write_command(&self.name)
                };

                if should_propagate {
                    let mut server_guard = server.write().await;
                    server_guard.propagate_write(&self.input).await;
                }

                reply
            }
            Ok(CommandResult::BeginReplicaSync(reply)) => reply,
            Err(e) => e.as_string(),
        }
    }
}
