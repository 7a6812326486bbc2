//! # Sliding-Expiration Reader
//!
//! Reads a session's raw value and resets its expiration in one pipelined
//! round trip (`GET` then `EXPIRE`). Every read therefore extends the
//! session, same as a write.

use std::time::Duration;

use crate::backend::{Command, Connection};
use crate::observability::{key_tag, Logger};

use super::errors::{SessionError, SessionResult};

/// Raw read of a session together with the expiration refresh result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Stored value, possibly empty
    pub value: Vec<u8>,
    /// Whether the expiration reset found the key
    pub refreshed: bool,
}

impl ReadOutcome {
    /// The value, provided the expiration was actually reset
    pub fn into_refreshed(self) -> SessionResult<Vec<u8>> {
        if self.refreshed {
            Ok(self.value)
        } else {
            Err(SessionError::refresh_missed())
        }
    }
}

/// Read-and-touch for one session lifetime
#[derive(Debug, Clone, Copy)]
pub struct SlidingReader {
    lifetime: Duration,
}

impl SlidingReader {
    pub fn new(lifetime: Duration) -> Self {
        Self { lifetime }
    }

    /// Read `key` and reset its expiration
    ///
    /// Fails with `KeyNotFound` if the key is absent. The refresh result is
    /// reported, not enforced; see [`SlidingReader::read`].
    pub fn fetch<C: Connection + ?Sized>(&self, conn: &mut C, key: &str) -> SessionResult<ReadOutcome> {
        let commands = [
            Command::Get(key.to_string()),
            Command::Expire {
                key: key.to_string(),
                ttl: self.lifetime,
            },
        ];

        let mut replies = conn.pipeline(&commands)?.into_iter();
        let (value, refreshed) = match (replies.next(), replies.next()) {
            (Some(get), Some(expire)) => (get.into_value()?, expire.into_bool()?),
            _ => {
                return Err(SessionError::Transport(
                    "pipeline returned too few replies".to_string(),
                ))
            }
        };

        let value = value.ok_or(SessionError::KeyNotFound)?;

        if !refreshed {
            Logger::warn("SLIDING_REFRESH_MISSED", &[("key", key_tag(key))]);
        }

        Ok(ReadOutcome { value, refreshed })
    }

    /// Read `key`, requiring the expiration reset to have applied
    ///
    /// A key that vanished between the two pipelined commands surfaces as
    /// `OperationFailed`.
    pub fn read<C: Connection + ?Sized>(&self, conn: &mut C, key: &str) -> SessionResult<Vec<u8>> {
        self.fetch(conn, key)?.into_refreshed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, MemoryBackend};

    const LIFETIME: Duration = Duration::from_secs(30);

    #[test]
    fn test_read_refreshes_ttl() {
        let backend = MemoryBackend::new();
        backend.put_raw("k", b"payload", Duration::from_secs(5)).unwrap();
        let mut conn = backend.connect().unwrap();

        let value = SlidingReader::new(LIFETIME).read(&mut conn, "k").unwrap();

        assert_eq!(value, b"payload");
        assert!(backend.ttl("k").unwrap() > Duration::from_secs(25));
    }

    #[test]
    fn test_empty_value_is_not_absent() {
        let backend = MemoryBackend::new();
        backend.put_raw("k", b"", LIFETIME).unwrap();
        let mut conn = backend.connect().unwrap();

        let value = SlidingReader::new(LIFETIME).read(&mut conn, "k").unwrap();
        assert!(value.is_empty());
    }

    #[test]
    fn test_absent_key() {
        let backend = MemoryBackend::new();
        let mut conn = backend.connect().unwrap();

        let result = SlidingReader::new(LIFETIME).read(&mut conn, "missing");
        assert_eq!(result, Err(SessionError::KeyNotFound));
    }

    #[test]
    fn test_refresh_race_reported() {
        let backend = MemoryBackend::new();
        backend.put_raw("k", b"v", LIFETIME).unwrap();
        backend.inject_expiry_race();
        let mut conn = backend.connect().unwrap();

        let outcome = SlidingReader::new(LIFETIME).fetch(&mut conn, "k").unwrap();
        assert_eq!(outcome.value, b"v");
        assert!(!outcome.refreshed);
        assert!(matches!(
            outcome.into_refreshed(),
            Err(SessionError::OperationFailed(_))
        ));
    }
}
