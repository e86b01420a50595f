use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{
    commands::{CommandError, command_handler::CommandResult},
    resp::RespValue,
    server::RedisServer,
};

/// Poll interval while waiting for replica acknowledgments to arrive.
const ACK_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct WaitArguments {
    required_replicas: usize,
    /// `None` means no deadline (a timeout of 0)
    timeout: Option<Duration>,
}

impl WaitArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let [required, timeout_ms] = arguments.as_slice() else {
            return Err(CommandError::WrongNumberOfArguments("wait".to_string()));
        };

        let required_replicas = required
            .parse::<usize>()
            .map_err(|_| CommandError::NotInteger)?;

        let timeout_ms = timeout_ms
            .parse::<u64>()
            .map_err(|_| CommandError::NotInteger)?;

        let timeout = match timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        Ok(Self {
            required_replicas,
            timeout,
        })
    }
}

/// Blocks until at least `numreplicas` replicas have acknowledged the
/// replication offset as it stood when WAIT arrived, or until the timeout.
///
/// If nothing has been written since startup there is nothing to confirm,
/// and the reply is simply the number of connected replicas. Otherwise every
/// replica is probed with `REPLCONF GETACK *`; the acks flow back through
/// the per-replica acknowledgment loops, and this task samples the counts on
/// a 10 ms tick. The reply is the count at success or at the deadline,
/// whichever comes first - never an error.
pub async fn wait(
    server: &Arc<RwLock<RedisServer>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let wait_arguments = WaitArguments::parse(arguments)?;

    let target_offset = {
        let server_guard = server.read().await;

        if server_guard.is_replica() {
            return Err(CommandError::MasterOnlyCommand("WAIT".to_string()));
        }

        if !server_guard.write_seen {
            return Ok(CommandResult::Response(
                RespValue::Integer(server_guard.connected_replicas() as i64).encode(),
            ));
        }

        server_guard.master_offset
    };

    {
        let server_guard = server.read().await;
        server_guard.send_getack_to_replicas().await;
    }

    let deadline = wait_arguments.timeout.map(|timeout| Instant::now() + timeout);

    loop {
        let acked = {
            let server_guard = server.read().await;
            server_guard.count_acked(target_offset)
        };

        if acked >= wait_arguments.required_replicas {
            return Ok(CommandResult::Response(
                RespValue::Integer(acked as i64).encode(),
            ));
        }

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Ok(CommandResult::Response(
                    RespValue::Integer(acked as i64).encode(),
                ));
            }
        }

        tokio::time::sleep(ACK_POLL_INTERVAL).await;
    }
}
