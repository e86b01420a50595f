//! A Redis-compatible in-memory key/value server.
//!
//! The crate implements the core of the protocol surface a Redis client or
//! replica expects:
//!
//! - RESP framing with exact byte accounting (the basis of replication
//!   offsets)
//! - String values with millisecond expiry, plus append-only streams
//!   (XADD, XRANGE, blocking XREAD)
//! - MULTI/EXEC/DISCARD transaction queuing, scoped to each connection
//! - Single-leader replication: FULLRESYNC with an RDB snapshot transfer,
//!   write propagation, REPLCONF GETACK/ACK offset tracking, and WAIT
//! - Loading an RDB snapshot into the keyspace at startup
//!
//! Connections are served concurrently on Tokio tasks that share the
//! keyspace behind a reader-writer lock.

pub mod commands;
pub mod connection;
pub mod input;
pub mod key_value_store;
pub mod rdb;
pub mod resp;
pub mod server;
pub mod transaction;
