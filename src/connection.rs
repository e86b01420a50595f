//! Connection handling for every kind of socket the server owns: ordinary
//! client connections (with their transaction state), connections that have
//! turned into replica links after PSYNC, and - on a replica - the session
//! with the master that carries the replication stream.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::commands::{CommandError, CommandHandler, CommandResult};
use crate::input::{CommandReadError, FrameReader, handshake};
use crate::key_value_store::KeyValueStore;
use crate::rdb::empty_rdb_bytes;
use crate::resp::RespValue;
use crate::server::{RedisServer, connect_with_backoff};
use crate::transaction::TransactionState;

/// Serves one client connection until it closes.
///
/// Each connection task owns its buffered reader, the write half of its
/// socket, and its transaction state. MULTI/EXEC/DISCARD are handled here
/// because they only touch that connection-local state; everything else is
/// dispatched through the command handler. A PSYNC flips the connection into
/// replica mode, after which the only traffic read from it is REPLCONF ACK.
pub async fn handle_client_connection(
    stream: TcpStream,
    server: Arc<RwLock<RedisServer>>,
    client_address: String,
    store: Arc<RwLock<KeyValueStore>>,
) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    let writer = Arc::new(Mutex::new(write_half));
    let mut transaction = TransactionState::new();

    loop {
        let (frame, _) = match reader.read_frame().await {
            Ok(frame) => frame,
            Err(CommandReadError::ConnectionClosed) => break,
            Err(e) => {
                debug!(client = %client_address, error = %e, "dropping connection");
                let _ = write_to_stream(&writer, e.as_string().as_bytes()).await;
                break;
            }
        };

        let handler = match CommandHandler::new(&frame) {
            Ok(handler) => handler,
            Err(e) => {
                if write_to_stream(&writer, e.as_string().as_bytes()).await.is_err() {
                    break;
                }
                continue;
            }
        };

        if write_forbidden(&server, &handler).await {
            let error = CommandError::WriteOnReplica.as_string();
            if write_to_stream(&writer, error.as_bytes()).await.is_err() {
                break;
            }
            continue;
        }

        match handler.name.as_str() {
            "MULTI" => {
                let reply = if transaction.begin() {
                    RespValue::SimpleString("OK".to_string()).encode()
                } else {
                    CommandError::MultiNested.as_string()
                };

                if write_to_stream(&writer, reply.as_bytes()).await.is_err() {
                    break;
                }
                continue;
            }
            "EXEC" => {
                let reply = match transaction.take() {
                    None => CommandError::ExecWithoutMulti.as_string(),
                    Some(queued) => {
                        let mut response = format!("*{}\r\n", queued.len());

                        for queued_command in queued {
                            response.push_str(
                                &queued_command.execute_and_propagate(&server, &store).await,
                            );
                        }

                        response
                    }
                };

                if write_to_stream(&writer, reply.as_bytes()).await.is_err() {
                    break;
                }
                continue;
            }
            "DISCARD" => {
                let reply = if transaction.discard() {
                    RespValue::SimpleString("OK".to_string()).encode()
                } else {
                    CommandError::DiscardWithoutMulti.as_string()
                };

                if write_to_stream(&writer, reply.as_bytes()).await.is_err() {
                    break;
                }
                continue;
            }
            _ => {}
        }

        // Anything else arriving mid-transaction is queued unvalidated;
        // arity problems surface when EXEC runs the queue.
        if transaction.is_queuing() {
            transaction.queue(handler);

            let reply = RespValue::SimpleString("QUEUED".to_string()).encode();
            if write_to_stream(&writer, reply.as_bytes()).await.is_err() {
                break;
            }
            continue;
        }

        if handler.name == "PSYNC" {
            match handler.execute(&server, &store).await {
                Ok(CommandResult::BeginReplicaSync(response)) => {
                    if begin_replica_sync(&writer, &server, &client_address, &response)
                        .await
                        .is_err()
                    {
                        break;
                    }

                    serve_replica_acks(reader, &server, &client_address).await;
                    return;
                }
                Ok(CommandResult::Response(response)) => {
                    if write_to_stream(&writer, response.as_bytes()).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    if write_to_stream(&writer, e.as_string().as_bytes()).await.is_err() {
                        break;
                    }
                }
            }
            continue;
        }

        let reply = handler.execute_and_propagate(&server, &store).await;

        if write_to_stream(&writer, reply.as_bytes()).await.is_err() {
            break;
        }
    }
}

/// Sends the FULLRESYNC reply and the length-prefixed snapshot payload, then
/// registers the connection as a replica. The payload is raw: `$<len>\r\n`
/// followed by the bytes, with no trailing CRLF.
async fn begin_replica_sync(
    writer: &Arc<Mutex<OwnedWriteHalf>>,
    server: &Arc<RwLock<RedisServer>>,
    client_address: &str,
    response: &str,
) -> tokio::io::Result<()> {
    let snapshot = empty_rdb_bytes();

    {
        let mut writer_guard = writer.lock().await;
        writer_guard.write_all(response.as_bytes()).await?;
        writer_guard
            .write_all(format!("${}\r\n", snapshot.len()).as_bytes())
            .await?;
        writer_guard.write_all(&snapshot).await?;
        writer_guard.flush().await?;
    }

    let mut server_guard = server.write().await;
    server_guard.register_replica(client_address, Arc::clone(writer));

    Ok(())
}

/// After PSYNC the master never again reads commands from the socket for
/// normal processing; the only expected traffic is `REPLCONF ACK <offset>`,
/// which updates the replica's acknowledged offset for WAIT. Socket close or
/// any read failure detaches the replica.
async fn serve_replica_acks(
    mut reader: FrameReader<OwnedReadHalf>,
    server: &Arc<RwLock<RedisServer>>,
    client_address: &str,
) {
    loop {
        let frame = match reader.read_frame().await {
            Ok((frame, _)) => frame,
            Err(_) => break,
        };

        let Ok(handler) = CommandHandler::new(&frame) else {
            continue;
        };

        let is_ack = handler.name == "REPLCONF"
            && handler
                .arguments
                .first()
                .is_some_and(|a| a.eq_ignore_ascii_case("ack"));

        if is_ack {
            if let Some(offset) = handler.arguments.get(1).and_then(|a| a.parse::<u64>().ok()) {
                let mut server_guard = server.write().await;
                server_guard.acknowledge_offset(client_address, offset);
            }
        }
    }

    let mut server_guard = server.write().await;
    server_guard.remove_replica(client_address);
}

/// The replica's replication session: connect, perform the handshake, then
/// consume the master's command stream forever. Lost sessions are retried
/// with a one second backoff.
pub async fn replicate_from_master(
    host: &str,
    port: u32,
    server: Arc<RwLock<RedisServer>>,
    store: Arc<RwLock<KeyValueStore>>,
) {
    loop {
        let stream = connect_with_backoff(host, port).await;
        let mut reader = FrameReader::new(stream);

        if let Err(e) = handshake(&mut reader, &server).await {
            warn!(error = %e, "replication handshake failed, retrying in 1s");
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        }

        // A fresh FULLRESYNC starts the stream over from offset zero.
        {
            let mut server_guard = server.write().await;
            server_guard.repl_offset = 0;
        }

        info!(host, port, "replication session established");

        if let Err(e) = handle_master_connection(&mut reader, &server, &store).await {
            warn!(error = %e, "replication stream interrupted, reconnecting in 1s");
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

/// The replication read loop on a replica.
///
/// Every frame from the master is applied to the local keyspace with its
/// reply suppressed. `REPLCONF GETACK *` is the exception: it is answered on
/// the same socket with the offset as it stood before the GETACK itself -
/// the probe's own bytes are only added afterwards, like every other
/// command's.
pub async fn handle_master_connection(
    reader: &mut FrameReader<TcpStream>,
    server: &Arc<RwLock<RedisServer>>,
    store: &Arc<RwLock<KeyValueStore>>,
) -> Result<(), CommandReadError> {
    loop {
        let (frame, consumed) = reader.read_frame().await?;

        if let Ok(handler) = CommandHandler::new(&frame) {
            let is_getack = handler.name == "REPLCONF"
                && handler
                    .arguments
                    .first()
                    .is_some_and(|a| a.eq_ignore_ascii_case("getack"));

            if is_getack {
                let offset = {
                    let server_guard = server.read().await;
                    server_guard.repl_offset
                };

                let ack =
                    RespValue::command(&["REPLCONF", "ACK", &offset.to_string()]).encode();

                let stream = reader.inner_mut();
                stream
                    .write_all(ack.as_bytes())
                    .await
                    .map_err(|e| CommandReadError::IoError(e.to_string()))?;
                stream
                    .flush()
                    .await
                    .map_err(|e| CommandReadError::IoError(e.to_string()))?;
            } else if let Err(e) = handler.execute(server, store).await {
                debug!(command = %handler.name, error = %e, "replicated command failed");
            }
        }

        let mut server_guard = server.write().await;
        server_guard.repl_offset += consumed as u64;
    }
}

pub async fn write_to_stream(
    writer: &Arc<Mutex<OwnedWriteHalf>>,
    response: &[u8],
) -> tokio::io::Result<()> {
    let mut writer_guard = writer.lock().await;
    writer_guard.write_all(response).await?;
    writer_guard.flush().await?;

    Ok(())
}

/// On a replica, ordinary clients may only read; writes belong to the
/// master's stream.
async fn write_forbidden(
    server: &Arc<RwLock<RedisServer>>,
    handler: &CommandHandler,
) -> bool {
    let server_guard = server.read().await;

    server_guard.is_replica() && server_guard.is_write_command(&handler.name)
}
