//! Shared helpers for the integration suites: spinning up real servers on
//! ephemeral ports and a small RESP client to talk to them.

use std::collections::HashMap;
use std::time::Duration;

use marlin_redis::server::RedisServer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};

/// Grabs an ephemeral port from the OS. The listener is dropped before the
/// server binds it, which is racy in principle but reliable in practice.
pub async fn free_port() -> u32 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port() as u32;
    drop(listener);

    port
}

/// Starts a server with the given extra flags on a fresh port and waits
/// until it accepts connections. Returns the port.
pub async fn start_server(extra_args: &[&str]) -> u32 {
    let port = free_port().await;

    let mut args = vec![
        "marlin-redis".to_string(),
        "--port".to_string(),
        port.to_string(),
    ];
    args.extend(extra_args.iter().map(|s| s.to_string()));

    let server = RedisServer::new(args).unwrap();

    tokio::spawn(async move {
        let _ = server.run(HashMap::new()).await;
    });

    wait_until_ready(port).await;

    port
}

pub async fn wait_until_ready(port: u32) {
    for _ in 0..100 {
        if TcpStream::connect(format!("127.0.0.1:{}", port)).await.is_ok() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }

    panic!("server on port {} never became ready", port);
}

/// A minimal RESP client for tests: sends commands as arrays of bulk
/// strings and reads whatever reply bytes arrive.
pub struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    pub async fn connect(port: u32) -> Self {
        let stream = TcpStream::connect(format!("127.0.0.1:{}", port))
            .await
            .unwrap();

        Self { stream }
    }

    pub fn encode_command(args: &[&str]) -> String {
        let mut encoded = format!("*{}\r\n", args.len());
        for arg in args {
            encoded.push_str(&format!("${}\r\n{}\r\n", arg.len(), arg));
        }
        encoded
    }

    /// Sends a command and returns the raw reply bytes as a string.
    pub async fn send(&mut self, args: &[&str]) -> String {
        self.send_raw(Self::encode_command(args).as_bytes()).await
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) -> String {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
        self.read_reply().await
    }

    pub async fn read_reply(&mut self) -> String {
        let mut buffer = [0u8; 65536];

        let n = timeout(Duration::from_secs(2), self.stream.read(&mut buffer))
            .await
            .expect("timed out waiting for a reply")
            .unwrap();

        String::from_utf8_lossy(&buffer[..n]).to_string()
    }

    /// Reads until `total` raw bytes have arrived (for the RDB transfer,
    /// which is not line-delimited).
    pub async fn read_exact_bytes(&mut self, total: usize) -> Vec<u8> {
        let mut buffer = vec![0u8; total];

        timeout(Duration::from_secs(2), self.stream.read_exact(&mut buffer))
            .await
            .expect("timed out waiting for raw bytes")
            .unwrap();

        buffer
    }

    pub fn into_stream(self) -> TcpStream {
        self.stream
    }
}

/// Polls `GET key` against a server until it returns the expected bulk
/// reply, failing after a bounded number of attempts. Used to observe
/// asynchronous replication.
pub async fn wait_for_value(port: u32, key: &str, expected_bulk: &str) {
    let mut client = TestClient::connect(port).await;

    for _ in 0..100 {
        if client.send(&["GET", key]).await == expected_bulk {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }

    panic!("key {} never reached expected value on port {}", key, port);
}
