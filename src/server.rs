//! Server configuration and the primary-side replication state.
//!
//! Parses the command-line flags, owns the role (master or replica), the
//! 40-character replication ID, and - on a master - the set of attached
//! replica connections together with the replication offset. Propagation of
//! write commands and WAIT acknowledgment counting both live here so that
//! offset advances and replica socket writes stay atomic with respect to
//! WAIT sampling: both happen under the same lock.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use regex::Regex;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::connection::{handle_client_connection, replicate_from_master};
use crate::key_value_store::{KeyValueStore, Value};
use crate::resp::RespValue;

/// Errors that can occur during command-line argument parsing.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum CliError {
    #[error("invalid command line flag")]
    InvalidCommandLineFlag,
    #[error("invalid port flag value")]
    InvalidPortFlagValue,
    #[error("invalid master address")]
    InvalidMasterAddress,
    #[error("invalid master port")]
    InvalidMasterPort,
}

/// The role of a server instance: a master accepts writes and fans them out,
/// a replica follows the master at the given `(host, port)` and serves reads.
#[derive(Debug, PartialEq, Clone)]
pub enum RedisRole {
    Master,
    Replica((String, u32)),
}

impl RedisRole {
    /// The wire-protocol name of the role, as reported by INFO.
    pub fn as_string(&self) -> &str {
        match self {
            RedisRole::Master => "master",
            RedisRole::Replica(_) => "slave",
        }
    }
}

/// One attached replica connection, tracked on the master: the write half of
/// its socket (for propagation and GETACK probes) and the last offset it has
/// acknowledged.
#[derive(Debug)]
pub struct Replica {
    pub writer: Arc<Mutex<OwnedWriteHalf>>,
    pub acked_offset: u64,
}

/// Configuration and replication state for one server instance.
#[derive(Debug)]
pub struct RedisServer {
    /// TCP port the server listens on
    pub port: u32,
    pub role: RedisRole,
    /// 40-character hexadecimal replication ID, generated once at startup
    pub repl_id: String,
    /// Replica side: bytes consumed from the master's command stream
    pub repl_offset: u64,
    /// Master side: bytes of write commands propagated to replicas
    pub master_offset: u64,
    /// Whether any write has been propagated since startup; WAIT answers
    /// immediately with the replica count while this is still false
    pub write_seen: bool,
    /// Directory holding the RDB snapshot
    pub rdb_directory: String,
    /// Snapshot filename inside `rdb_directory`
    pub rdb_filename: String,
    /// Attached replicas, keyed by client address (masters only)
    pub replicas: Option<HashMap<String, Replica>>,
    /// Command names that mutate the keyspace and must be propagated
    pub write_commands: Vec<&'static str>,
}

impl RedisServer {
    /// Builds a server from command-line arguments.
    ///
    /// # Supported flags
    ///
    /// * `--port <n>` - listen port (default 6379)
    /// * `--replicaof "<host> <port>"` - run as a replica of the given master
    /// * `--dir <path>` - directory containing the RDB snapshot (default `.`)
    /// * `--dbfilename <name>` - snapshot filename (default `dump.rdb`)
    pub fn new<I: IntoIterator<Item = String>>(command_line_args: I) -> Result<Self, CliError> {
        let mut iter = command_line_args.into_iter().skip(1);
        let mut port: Option<u32> = None;
        let mut role: Option<RedisRole> = None;
        let mut rdb_directory: Option<String> = None;
        let mut rdb_filename: Option<String> = None;

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--port" => {
                    let value = iter.next().ok_or(CliError::InvalidCommandLineFlag)?;
                    port = Some(validate_port(&value, CliError::InvalidPortFlagValue)?);
                }
                "--replicaof" => {
                    let value = iter.next().ok_or(CliError::InvalidCommandLineFlag)?;
                    role = Some(RedisRole::Replica(validate_master_address(&value)?));
                }
                "--dir" => {
                    rdb_directory = Some(iter.next().ok_or(CliError::InvalidCommandLineFlag)?);
                }
                "--dbfilename" => {
                    rdb_filename = Some(iter.next().ok_or(CliError::InvalidCommandLineFlag)?);
                }
                _ => return Err(CliError::InvalidCommandLineFlag),
            }
        }

        let role = role.unwrap_or(RedisRole::Master);

        let replicas = match role {
            RedisRole::Master => Some(HashMap::new()),
            RedisRole::Replica(_) => None,
        };

        Ok(RedisServer {
            port: port.unwrap_or(6379),
            role,
            repl_id: generate_replication_id(),
            repl_offset: 0,
            master_offset: 0,
            write_seen: false,
            rdb_directory: rdb_directory.unwrap_or_else(|| ".".to_string()),
            rdb_filename: rdb_filename.unwrap_or_else(|| "dump.rdb".to_string()),
            replicas,
            write_commands: Vec::from(["SET", "DEL", "INCR", "XADD"]),
        })
    }

    pub fn is_replica(&self) -> bool {
        matches!(self.role, RedisRole::Replica(_))
    }

    pub fn is_write_command(&self, name: &str) -> bool {
        self.write_commands.contains(&name)
    }

    /// Registers a replica after it has completed PSYNC and received the
    /// initial snapshot.
    pub fn register_replica(&mut self, address: &str, writer: Arc<Mutex<OwnedWriteHalf>>) {
        if let Some(replicas) = &mut self.replicas {
            info!(replica = %address, "replica attached");
            replicas.insert(
                address.to_string(),
                Replica {
                    writer,
                    acked_offset: 0,
                },
            );
        }
    }

    pub fn remove_replica(&mut self, address: &str) {
        if let Some(replicas) = &mut self.replicas {
            if replicas.remove(address).is_some() {
                info!(replica = %address, "replica detached");
            }
        }
    }

    /// Records a `REPLCONF ACK <offset>` received from a replica.
    pub fn acknowledge_offset(&mut self, address: &str, offset: u64) {
        if let Some(replicas) = &mut self.replicas {
            if let Some(replica) = replicas.get_mut(address) {
                replica.acked_offset = offset;
            }
        }
    }

    pub fn connected_replicas(&self) -> usize {
        self.replicas.as_ref().map(HashMap::len).unwrap_or(0)
    }

    /// Number of replicas whose acknowledged offset has reached `target`.
    pub fn count_acked(&self, target: u64) -> usize {
        self.replicas
            .as_ref()
            .map(|replicas| {
                replicas
                    .values()
                    .filter(|replica| replica.acked_offset >= target)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Propagates a successful write to every attached replica, advancing the
    /// replication offset by the encoded byte length. A replica whose socket
    /// write fails is dropped; the client's command is unaffected.
    ///
    /// Callers hold the server lock exclusively, which is what makes the
    /// offset advance and the socket writes atomic with respect to WAIT.
    pub async fn propagate_write(&mut self, input: &RespValue) {
        let encoded = input.encode();

        self.master_offset += encoded.len() as u64;
        self.write_seen = true;

        let Some(replicas) = &mut self.replicas else {
            return;
        };

        let mut failed: Vec<String> = Vec::new();

        for (address, replica) in replicas.iter() {
            let mut writer = replica.writer.lock().await;

            if let Err(e) = writer.write_all(encoded.as_bytes()).await {
                warn!(replica = %address, error = %e, "dropping replica after failed propagation");
                failed.push(address.clone());
                continue;
            }

            if let Err(e) = writer.flush().await {
                warn!(replica = %address, error = %e, "dropping replica after failed flush");
                failed.push(address.clone());
            }
        }

        for address in failed {
            replicas.remove(&address);
        }
    }

    /// Sends `REPLCONF GETACK *` to every replica so they report their
    /// current offsets. The probe is not a write command and does not
    /// advance the master's replication offset.
    pub async fn send_getack_to_replicas(&self) {
        let Some(replicas) = &self.replicas else {
            return;
        };

        let probe = RespValue::command(&["REPLCONF", "GETACK", "*"]).encode();

        for (address, replica) in replicas.iter() {
            let mut writer = replica.writer.lock().await;

            if let Err(e) = writer.write_all(probe.as_bytes()).await {
                warn!(replica = %address, error = %e, "failed to send GETACK probe");
            }
        }
    }

    /// The `replication` section of INFO.
    pub fn replication_info(&self) -> String {
        let mut info = format!("role:{}\r\n", self.role.as_string());
        info.push_str(&format!("master_replid:{}\r\n", self.repl_id));

        match &self.role {
            RedisRole::Master => {
                info.push_str(&format!("master_repl_offset:{}\r\n", self.master_offset));
            }
            RedisRole::Replica((host, port)) => {
                info.push_str(&format!("master_repl_offset:{}\r\n", self.repl_offset));
                info.push_str(&format!("master_host:{}\r\n", host));
                info.push_str(&format!("master_port:{}\r\n", port));
            }
        }

        info
    }

    /// Runs the server: starts the replication session when configured as a
    /// replica, then accepts client connections until the process exits.
    pub async fn run(self, snapshot: HashMap<String, Value>) -> tokio::io::Result<()> {
        let port = self.port;
        let role = self.role.clone();

        let store = Arc::new(RwLock::new(KeyValueStore::from_snapshot(snapshot)));
        let server = Arc::new(RwLock::new(self));

        if let RedisRole::Replica((host, master_port)) = role {
            let server_clone = Arc::clone(&server);
            let store_clone = Arc::clone(&store);

            tokio::spawn(async move {
                replicate_from_master(&host, master_port, server_clone, store_clone).await;
            });
        }

        let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
        info!(port, "listening for connections");

        loop {
            match listener.accept().await {
                Ok((stream, client_address)) => {
                    let server_clone = Arc::clone(&server);
                    let store_clone = Arc::clone(&store);

                    tokio::spawn(async move {
                        handle_client_connection(
                            stream,
                            server_clone,
                            client_address.to_string(),
                            store_clone,
                        )
                        .await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                }
            }
        }
    }
}

/// Connects to a master during replica startup, retrying forever with a one
/// second backoff; the caller owns the handshake once connected.
pub async fn connect_with_backoff(host: &str, port: u32) -> TcpStream {
    loop {
        match TcpStream::connect(format!("{}:{}", host, port)).await {
            Ok(stream) => return stream,
            Err(e) => {
                warn!(host, port, error = %e, "failed to reach master, retrying in 1s");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}

/// Generates the 40-character hexadecimal replication ID.
fn generate_replication_id() -> String {
    const HEX_DIGITS: &[u8] = b"0123456789abcdef";
    let mut rng = rand::rng();

    (0..40)
        .map(|_| HEX_DIGITS[rng.random_range(0..HEX_DIGITS.len())] as char)
        .collect()
}

fn validate_port(port: &str, error: CliError) -> Result<u32, CliError> {
    let port_number = port.parse::<u32>().map_err(|_| error.clone())?;

    if !(1..=65535).contains(&port_number) {
        return Err(error);
    }

    Ok(port_number)
}

/// Parses and validates a `"<host> <port>"` master address. The host may be
/// an IPv4 address (each octet checked) or a hostname.
fn validate_master_address(master_address: &str) -> Result<(String, u32), CliError> {
    let parts: Vec<&str> = master_address.split_whitespace().collect();

    if parts.len() != 2 {
        return Err(CliError::InvalidMasterAddress);
    }

    let host = parts[0];
    let ipv4_regex = Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$").unwrap();
    let hostname_regex = Regex::new(r"^[a-zA-Z0-9\-\.]+$").unwrap();

    let host_is_valid = match ipv4_regex.captures(host) {
        Some(captures) => captures.iter().skip(1).all(|octet| {
            octet
                .and_then(|m| m.as_str().parse::<u16>().ok())
                .map(|value| value <= 255)
                .unwrap_or(false)
        }),
        None => hostname_regex.is_match(host),
    };

    if !host_is_valid {
        return Err(CliError::InvalidMasterAddress);
    }

    let port = validate_port(parts[1], CliError::InvalidMasterPort)?;

    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(rest: &[&str]) -> Vec<String> {
        let mut all = vec!["marlin-redis".to_string()];
        all.extend(rest.iter().map(|s| s.to_string()));
        all
    }

    #[test]
    fn test_defaults() {
        let server = RedisServer::new(args(&[])).unwrap();

        assert_eq!(server.port, 6379);
        assert_eq!(server.role, RedisRole::Master);
        assert_eq!(server.rdb_directory, ".");
        assert_eq!(server.rdb_filename, "dump.rdb");
        assert_eq!(server.master_offset, 0);
        assert_eq!(server.write_seen, false);
        assert!(server.replicas.is_some());
    }

    #[test]
    fn test_flag_parsing() {
        let server = RedisServer::new(args(&[
            "--port",
            "7001",
            "--dir",
            "/var/lib/marlin",
            "--dbfilename",
            "snapshot.rdb",
        ]))
        .unwrap();

        assert_eq!(server.port, 7001);
        assert_eq!(server.rdb_directory, "/var/lib/marlin");
        assert_eq!(server.rdb_filename, "snapshot.rdb");
    }

    #[test]
    fn test_replicaof_flag() {
        let server = RedisServer::new(args(&["--replicaof", "127.0.0.1 6380"])).unwrap();

        assert_eq!(
            server.role,
            RedisRole::Replica(("127.0.0.1".to_string(), 6380))
        );
        assert!(server.replicas.is_none());
        assert_eq!(server.role.as_string(), "slave");
    }

    #[test]
    fn test_invalid_flags() {
        let test_cases = vec![
            (args(&["--port"]), CliError::InvalidCommandLineFlag),
            (args(&["--port", "abc"]), CliError::InvalidPortFlagValue),
            (args(&["--port", "0"]), CliError::InvalidPortFlagValue),
            (args(&["--port", "70000"]), CliError::InvalidPortFlagValue),
            (args(&["--bogus"]), CliError::InvalidCommandLineFlag),
            (args(&["--replicaof"]), CliError::InvalidCommandLineFlag),
            (
                args(&["--replicaof", "localhost"]),
                CliError::InvalidMasterAddress,
            ),
            (
                args(&["--replicaof", "localhost 6379 extra"]),
                CliError::InvalidMasterAddress,
            ),
            (
                args(&["--replicaof", "300.0.0.1 6379"]),
                CliError::InvalidMasterAddress,
            ),
            (
                args(&["--replicaof", "bad_host! 6379"]),
                CliError::InvalidMasterAddress,
            ),
            (
                args(&["--replicaof", "localhost notaport"]),
                CliError::InvalidMasterPort,
            ),
            (
                args(&["--replicaof", "localhost 99999"]),
                CliError::InvalidMasterPort,
            ),
        ];

        for (input, expected_error) in test_cases {
            let result = RedisServer::new(input.clone());
            assert!(result.is_err(), "parsing {:?} should fail", input);
            assert_eq!(
                result.err().unwrap(),
                expected_error,
                "parsing {:?}",
                input
            );
        }
    }

    #[test]
    fn test_replication_id_is_40_hex_characters() {
        let server = RedisServer::new(args(&[])).unwrap();

        assert_eq!(server.repl_id.len(), 40);
        assert!(server.repl_id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_replication_ids_are_unique() {
        let first = RedisServer::new(args(&[])).unwrap();
        let second = RedisServer::new(args(&[])).unwrap();

        assert_ne!(first.repl_id, second.repl_id);
    }

    #[test]
    fn test_replication_info_master() {
        let mut server = RedisServer::new(args(&[])).unwrap();
        server.master_offset = 151;

        let info = server.replication_info();

        assert!(info.contains("role:master\r\n"));
        assert!(info.contains(&format!("master_replid:{}\r\n", server.repl_id)));
        assert!(info.contains("master_repl_offset:151\r\n"));
        assert!(!info.contains("master_host:"));
    }

    #[test]
    fn test_replication_info_replica() {
        let server = RedisServer::new(args(&["--replicaof", "10.0.0.5 6400"])).unwrap();

        let info = server.replication_info();

        assert!(info.contains("role:slave\r\n"));
        assert!(info.contains("master_host:10.0.0.5\r\n"));
        assert!(info.contains("master_port:6400\r\n"));
    }

    #[test]
    fn test_count_acked() {
        let mut server = RedisServer::new(args(&[])).unwrap();

        assert_eq!(server.count_acked(0), 0);
        assert_eq!(server.connected_replicas(), 0);

        // No replica writers needed to exercise the counting itself.
        server.acknowledge_offset("nobody", 10);
        assert_eq!(server.count_acked(10), 0);
    }

    #[test]
    fn test_write_command_classification() {
        let server = RedisServer::new(args(&[])).unwrap();

        for name in ["SET", "DEL", "INCR", "XADD"] {
            assert!(server.is_write_command(name), "{} should be a write", name);
        }

        for name in ["GET", "KEYS", "TYPE", "XRANGE", "XREAD", "PING"] {
            assert!(!server.is_write_command(name), "{} should be a read", name);
        }
    }
}
