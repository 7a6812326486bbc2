//! # Session Store
//!
//! Caller-facing session operations over a [`Backend`].
//!
//! Every operation opens its own connection and drops it before returning.
//! Every operation that finds the session resets its expiration to the
//! client lifetime.
//!
//! ## Liveness
//! `check_live` returns `Err(KeyNotFound)` for an absent key, `Ok(false)`
//! when the key was read but vanished before its expiration could be reset,
//! and `Ok(true)` otherwise.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Backend, Connection};
use crate::config::ClientConfig;
use crate::observability::{key_tag, Logger, SessionMetrics, SessionMetricsSnapshot};

use super::codec;
use super::errors::{SessionError, SessionResult};
use super::key::{generate_session_key, SessionKey};
use super::mutator::{FieldMutation, OptimisticMutator, DEFAULT_MAX_RETRIES};
use super::reader::SlidingReader;
use super::value::StoreValue;

/// Session store client
///
/// The lifetime is fixed per client; clients with different lifetimes can
/// share one backend.
pub struct SessionStore<B: Backend> {
    backend: B,
    lifetime: Duration,
    reader: SlidingReader,
    mutator: OptimisticMutator,
    metrics: Arc<SessionMetrics>,
}

impl<B: Backend> SessionStore<B> {
    /// Client with the default retry ceiling
    pub fn new(backend: B, lifetime: Duration) -> Self {
        Self::with_max_retries(backend, lifetime, DEFAULT_MAX_RETRIES)
    }

    pub fn with_max_retries(backend: B, lifetime: Duration, max_retries: u32) -> Self {
        let metrics = Arc::new(SessionMetrics::new());
        Self {
            backend,
            lifetime,
            reader: SlidingReader::new(lifetime),
            mutator: OptimisticMutator::with_metrics(lifetime, max_retries, Arc::clone(&metrics)),
            metrics,
        }
    }

    /// Client using the lifetime and retry ceiling from `config`
    pub fn from_config(backend: B, config: &ClientConfig) -> SessionResult<Self> {
        config.validate()?;
        Ok(Self::with_max_retries(
            backend,
            config.lifetime(),
            config.max_retries,
        ))
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn metrics(&self) -> SessionMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Create a session with an empty record
    ///
    /// The key is live in the store when this returns.
    pub fn create_session(&self) -> SessionResult<SessionKey> {
        let key = generate_session_key();

        let mut conn = self.backend.connect()?;
        conn.set(key.as_str(), &[], self.lifetime)?;

        self.metrics.increment_sessions_created();
        Logger::info("SESSION_CREATED", &[("key", key_tag(key.as_str()))]);

        Ok(key)
    }

    /// Check that a session exists, extending it
    pub fn check_live(&self, key: &SessionKey) -> SessionResult<bool> {
        let mut conn = self.backend.connect()?;
        let outcome = self.reader.fetch(&mut conn, key.as_str())?;
        self.metrics.increment_reads();
        Ok(outcome.refreshed)
    }

    /// Read one field, extending the session
    pub fn get(&self, key: &SessionKey, suffix: &str) -> SessionResult<Vec<u8>> {
        let mut conn = self.backend.connect()?;
        let raw = self.reader.read(&mut conn, key.as_str())?;
        self.metrics.increment_reads();

        codec::decode_stored(&raw)?
            .take(suffix)
            .ok_or(SessionError::SuffixNotFound)
    }

    /// Insert or overwrite one field, extending the session
    pub fn set(&self, key: &SessionKey, suffix: &str, payload: &[u8]) -> SessionResult<()> {
        let mut conn = self.backend.connect()?;
        self.mutator
            .mutate(&mut conn, key.as_str(), FieldMutation::Set { suffix, payload })?;
        Ok(())
    }

    /// Remove one field, extending the session
    ///
    /// Fails with `SuffixNotFound` if the field is not set.
    pub fn delete(&self, key: &SessionKey, suffix: &str) -> SessionResult<()> {
        let mut conn = self.backend.connect()?;
        self.mutator
            .mutate(&mut conn, key.as_str(), FieldMutation::Delete { suffix })?;
        Ok(())
    }

    /// Remove the session immediately
    ///
    /// Destroying an absent session succeeds.
    pub fn destroy(&self, key: &SessionKey) -> SessionResult<()> {
        let mut conn = self.backend.connect()?;
        let removed = conn.del(key.as_str())?;

        if removed > 0 {
            self.metrics.increment_sessions_destroyed();
            Logger::info("SESSION_DESTROYED", &[("key", key_tag(key.as_str()))]);
        }

        Ok(())
    }

    /// Encode and store a typed value in one field
    pub fn set_value<V: StoreValue>(&self, key: &SessionKey, suffix: &str, value: &V) -> SessionResult<()> {
        let payload = value.encode()?;
        self.set(key, suffix, &payload)
    }

    /// Read and decode a typed value from one field
    pub fn get_value<V: StoreValue>(&self, key: &SessionKey, suffix: &str) -> SessionResult<V> {
        V::decode(&self.get(key, suffix)?)
    }
}

#[cfg(feature = "redis")]
impl SessionStore<crate::backend::RedisBackend> {
    /// Client for the Redis server named in `config`
    pub fn open(config: &ClientConfig) -> SessionResult<Self> {
        let backend = crate::backend::RedisBackend::new(config)?;
        Self::from_config(backend, config)
    }
}
