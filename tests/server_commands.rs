//! End-to-end command tests over real TCP connections.

mod common;

use std::time::Duration;

use common::{TestClient, start_server};
use tokio::time::sleep;

#[tokio::test]
async fn test_ping_and_echo() {
    let port = start_server(&[]).await;
    let mut client = TestClient::connect(port).await;

    assert_eq!(client.send(&["PING"]).await, "+PONG\r\n");
    assert_eq!(client.send(&["ECHO", "hey"]).await, "$3\r\nhey\r\n");
    assert_eq!(client.send(&["ping"]).await, "+PONG\r\n");
}

#[tokio::test]
async fn test_set_get_roundtrip() {
    let port = start_server(&[]).await;
    let mut client = TestClient::connect(port).await;

    assert_eq!(client.send(&["SET", "foo", "bar"]).await, "+OK\r\n");
    assert_eq!(client.send(&["GET", "foo"]).await, "$3\r\nbar\r\n");
    assert_eq!(client.send(&["GET", "missing"]).await, "$-1\r\n");
}

#[tokio::test]
async fn test_set_with_px_expires() {
    let port = start_server(&[]).await;
    let mut client = TestClient::connect(port).await;

    assert_eq!(
        client.send(&["SET", "foo", "bar", "PX", "100"]).await,
        "+OK\r\n"
    );
    assert_eq!(client.send(&["GET", "foo"]).await, "$3\r\nbar\r\n");

    sleep(Duration::from_millis(150)).await;

    assert_eq!(client.send(&["GET", "foo"]).await, "$-1\r\n");
}

#[tokio::test]
async fn test_del() {
    let port = start_server(&[]).await;
    let mut client = TestClient::connect(port).await;

    client.send(&["SET", "a", "1"]).await;
    client.send(&["SET", "b", "2"]).await;

    assert_eq!(client.send(&["DEL", "a", "b", "ghost"]).await, ":2\r\n");
    assert_eq!(client.send(&["GET", "a"]).await, "$-1\r\n");
    assert_eq!(client.send(&["DEL", "a"]).await, ":0\r\n");
}

#[tokio::test]
async fn test_incr_semantics() {
    let port = start_server(&[]).await;
    let mut client = TestClient::connect(port).await;

    assert_eq!(client.send(&["SET", "n", "10"]).await, "+OK\r\n");
    assert_eq!(client.send(&["INCR", "n"]).await, ":11\r\n");
    assert_eq!(client.send(&["INCR", "fresh"]).await, ":1\r\n");
    assert_eq!(client.send(&["INCR", "fresh"]).await, ":2\r\n");

    client.send(&["SET", "n", "x"]).await;
    assert_eq!(
        client.send(&["INCR", "n"]).await,
        "-ERR value is not an integer or out of range\r\n"
    );
}

#[tokio::test]
async fn test_keys_and_type() {
    let port = start_server(&[]).await;
    let mut client = TestClient::connect(port).await;

    assert_eq!(client.send(&["KEYS", "*"]).await, "*0\r\n");

    client.send(&["SET", "plain", "v"]).await;
    client.send(&["XADD", "events", "1-1", "kind", "login"]).await;

    let keys_reply = client.send(&["KEYS", "*"]).await;
    assert!(keys_reply.starts_with("*2\r\n"), "got {:?}", keys_reply);
    assert!(keys_reply.contains("$5\r\nplain\r\n"));
    assert!(keys_reply.contains("$6\r\nevents\r\n"));

    assert_eq!(client.send(&["TYPE", "plain"]).await, "+string\r\n");
    assert_eq!(client.send(&["TYPE", "events"]).await, "+stream\r\n");
    assert_eq!(client.send(&["TYPE", "ghost"]).await, "+none\r\n");
}

#[tokio::test]
async fn test_get_on_stream_is_an_error() {
    let port = start_server(&[]).await;
    let mut client = TestClient::connect(port).await;

    client.send(&["XADD", "s", "1-1", "a", "1"]).await;

    assert_eq!(
        client.send(&["GET", "s"]).await,
        "-ERR GET command cannot be used with stream values\r\n"
    );
}

#[tokio::test]
async fn test_config_get() {
    let port = start_server(&["--dir", "/tmp/marlin", "--dbfilename", "snap.rdb"]).await;
    let mut client = TestClient::connect(port).await;

    assert_eq!(
        client.send(&["CONFIG", "GET", "dir"]).await,
        "*2\r\n$3\r\ndir\r\n$11\r\n/tmp/marlin\r\n"
    );
    assert_eq!(
        client.send(&["CONFIG", "GET", "dbfilename"]).await,
        "*2\r\n$10\r\ndbfilename\r\n$8\r\nsnap.rdb\r\n"
    );
}

#[tokio::test]
async fn test_info_replication_on_master() {
    let port = start_server(&[]).await;
    let mut client = TestClient::connect(port).await;

    let reply = client.send(&["INFO", "replication"]).await;

    assert!(reply.starts_with('$'), "expected bulk string, got {:?}", reply);
    assert!(reply.contains("role:master\r\n"));
    assert!(reply.contains("master_replid:"));
    assert!(reply.contains("master_repl_offset:0\r\n"));
}

#[tokio::test]
async fn test_unknown_command_and_arity_errors() {
    let port = start_server(&[]).await;
    let mut client = TestClient::connect(port).await;

    assert_eq!(
        client.send(&["FLY", "me"]).await,
        "-ERR unknown command 'FLY'\r\n"
    );
    assert_eq!(
        client.send(&["GET"]).await,
        "-ERR wrong number of arguments for 'get'\r\n"
    );
    assert_eq!(
        client.send(&["SET", "only-key"]).await,
        "-ERR wrong number of arguments for 'set'\r\n"
    );

    // Domain errors leave the connection usable.
    assert_eq!(client.send(&["PING"]).await, "+PONG\r\n");
}

#[tokio::test]
async fn test_commands_from_multiple_connections_share_the_keyspace() {
    let port = start_server(&[]).await;
    let mut first = TestClient::connect(port).await;
    let mut second = TestClient::connect(port).await;

    first.send(&["SET", "shared", "yes"]).await;

    assert_eq!(second.send(&["GET", "shared"]).await, "$3\r\nyes\r\n");
}
