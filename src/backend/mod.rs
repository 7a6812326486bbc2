//! # Store Backends
//!
//! The boundary between the session protocol and the key-value store.
//!
//! A [`Backend`] hands out one [`Connection`] per session operation. The
//! connection is released when dropped, so every exit path of an operation
//! gives it back.
//!
//! Two backends ship with the crate:
//! - [`MemoryBackend`]: in-process store with TTLs, watch semantics and
//!   conflict injection for deterministic tests
//! - `RedisBackend`: a Redis server via the `redis` crate (feature `redis`)

use std::time::Duration;

use crate::session::{SessionError, SessionResult};

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::{MemoryBackend, MemoryConnection};
#[cfg(feature = "redis")]
pub use self::redis::{RedisBackend, RedisConnection};

/// Factory for store connections
pub trait Backend: Send + Sync {
    type Conn: Connection;

    /// Establish a usable connection
    fn connect(&self) -> SessionResult<Self::Conn>;
}

/// Transform run inside a watch transaction
///
/// Receives the value read under watch (`None` when the key is absent) and
/// returns the value to commit. Returning an error aborts the transaction
/// without writing.
pub type WatchTransform<'a> = dyn FnMut(Option<Vec<u8>>) -> SessionResult<Vec<u8>> + 'a;

/// Single-key operations required from the store
pub trait Connection {
    /// Read a key
    fn get(&mut self, key: &str) -> SessionResult<Option<Vec<u8>>>;

    /// Write a key with an expiration
    fn set(&mut self, key: &str, value: &[u8], ttl: Duration) -> SessionResult<()>;

    /// Reset a key's expiration; false when the key is absent
    fn expire(&mut self, key: &str, ttl: Duration) -> SessionResult<bool>;

    /// Delete a key, returning the number of keys removed
    fn del(&mut self, key: &str) -> SessionResult<u64>;

    /// Send independent commands in one round trip
    ///
    /// Replies come back in command order. The store may run the commands
    /// independently, so other clients can interleave between them.
    fn pipeline(&mut self, commands: &[Command]) -> SessionResult<Vec<Reply>>;

    /// Optimistic read-modify-write of one key
    ///
    /// Watches `key`, reads it, runs `transform`, and writes the result with
    /// expiration `ttl` only if nobody modified `key` since the read.
    fn watch_transaction(
        &mut self,
        key: &str,
        ttl: Duration,
        transform: &mut WatchTransform<'_>,
    ) -> SessionResult<TxOutcome>;
}

/// Result of a watch transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// The write was applied
    Committed,
    /// The watched key changed before commit; nothing was written
    Conflict,
}

/// Command queued in a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get(String),
    Set {
        key: String,
        value: Vec<u8>,
        ttl: Duration,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
    Del(String),
}

/// Reply to a pipelined command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Reply to `Get`
    Value(Option<Vec<u8>>),
    /// Reply to `Set`
    Ok,
    /// Reply to `Expire`
    Bool(bool),
    /// Reply to `Del`
    Count(u64),
}

impl Reply {
    /// Unwrap a `Get` reply
    pub fn into_value(self) -> SessionResult<Option<Vec<u8>>> {
        match self {
            Reply::Value(v) => Ok(v),
            other => Err(unexpected_reply("value", &other)),
        }
    }

    /// Unwrap an `Expire` reply
    pub fn into_bool(self) -> SessionResult<bool> {
        match self {
            Reply::Bool(b) => Ok(b),
            other => Err(unexpected_reply("bool", &other)),
        }
    }
}

fn unexpected_reply(expected: &str, got: &Reply) -> SessionError {
    SessionError::Transport(format!("expected {} reply, got {:?}", expected, got))
}

/// Longest expiration a client may configure, in seconds
///
/// Half of what a millisecond `i64` deadline can hold, which leaves room for
/// the server's current time.
pub const MAX_TTL_SECS: u64 = (i64::MAX / 1000 / 2) as u64;

/// Whole seconds for a store expiration, never below one
pub fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
