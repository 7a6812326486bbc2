//! # Redis Backend
//!
//! Session storage on a Redis server.
//!
//! Watch transactions use `WATCH` + `GET` followed by a `MULTI`/`EXEC` block
//! holding a single `SET ... EX`. A nil `EXEC` reply means the watched key was
//! touched and nothing was written.

use std::time::Duration;

use redis::{Client, Value};

use super::{ttl_secs, Backend, Command, Connection, Reply, TxOutcome, WatchTransform};
use crate::config::ClientConfig;
use crate::session::{SessionError, SessionResult};

/// Connection factory for a Redis server
#[derive(Debug, Clone)]
pub struct RedisBackend {
    client: Client,
}

impl RedisBackend {
    /// Create a backend for the configured address and database
    ///
    /// No connection is made until the first operation.
    pub fn new(config: &ClientConfig) -> SessionResult<Self> {
        config.validate()?;
        let client = Client::open(config.redis_url())?;
        Ok(Self { client })
    }
}

impl Backend for RedisBackend {
    type Conn = RedisConnection;

    fn connect(&self) -> SessionResult<RedisConnection> {
        let mut conn = self.client.get_connection()?;
        redis::cmd("PING").query::<()>(&mut conn)?;
        Ok(RedisConnection { conn })
    }
}

/// A single Redis connection, closed on drop
pub struct RedisConnection {
    conn: redis::Connection,
}

impl Connection for RedisConnection {
    fn get(&mut self, key: &str) -> SessionResult<Option<Vec<u8>>> {
        Ok(redis::cmd("GET").arg(key).query(&mut self.conn)?)
    }

    fn set(&mut self, key: &str, value: &[u8], ttl: Duration) -> SessionResult<()> {
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query::<()>(&mut self.conn)?;
        Ok(())
    }

    fn expire(&mut self, key: &str, ttl: Duration) -> SessionResult<bool> {
        Ok(redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs(ttl))
            .query(&mut self.conn)?)
    }

    fn del(&mut self, key: &str) -> SessionResult<u64> {
        Ok(redis::cmd("DEL").arg(key).query(&mut self.conn)?)
    }

    fn pipeline(&mut self, commands: &[Command]) -> SessionResult<Vec<Reply>> {
        let mut pipe = redis::pipe();
        for command in commands {
            match command {
                Command::Get(key) => {
                    pipe.cmd("GET").arg(key);
                }
                Command::Set { key, value, ttl } => {
                    pipe.cmd("SET")
                        .arg(key)
                        .arg(value.as_slice())
                        .arg("EX")
                        .arg(ttl_secs(*ttl));
                }
                Command::Expire { key, ttl } => {
                    pipe.cmd("EXPIRE").arg(key).arg(ttl_secs(*ttl));
                }
                Command::Del(key) => {
                    pipe.cmd("DEL").arg(key);
                }
            }
        }

        let values: Vec<Value> = pipe.query(&mut self.conn)?;

        commands
            .iter()
            .zip(values.iter())
            .map(|(command, value)| -> SessionResult<Reply> {
                Ok(match command {
                    Command::Get(_) => Reply::Value(redis::from_redis_value(value)?),
                    Command::Set { .. } => Reply::Ok,
                    Command::Expire { .. } => Reply::Bool(redis::from_redis_value(value)?),
                    Command::Del(_) => Reply::Count(redis::from_redis_value(value)?),
                })
            })
            .collect()
    }

    fn watch_transaction(
        &mut self,
        key: &str,
        ttl: Duration,
        transform: &mut WatchTransform<'_>,
    ) -> SessionResult<TxOutcome> {
        redis::cmd("WATCH").arg(key).query::<()>(&mut self.conn)?;

        let staged = redis::cmd("GET")
            .arg(key)
            .query::<Option<Vec<u8>>>(&mut self.conn)
            .map_err(SessionError::from)
            .and_then(|current| transform(current));

        let value = match staged {
            Ok(value) => value,
            Err(e) => {
                // Release the watch; the connection is dropped right after anyway.
                let _ = redis::cmd("UNWATCH").query::<()>(&mut self.conn);
                return Err(e);
            }
        };

        let response: Option<(Value,)> = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query(&mut self.conn)?;

        Ok(match response {
            Some(_) => TxOutcome::Committed,
            None => TxOutcome::Conflict,
        })
    }
}
