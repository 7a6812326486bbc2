//! # Optimistic Mutator
//!
//! Field-level updates of a session record that is stored as one opaque
//! value. Each attempt watches the session key, reads and decodes the
//! record, applies a transform, re-encodes, and commits with a full
//! expiration reset only if the key is unchanged since the read. A conflict
//! restarts the attempt from a fresh read, up to a fixed number of attempts.
//!
//! ## Invariants
//! - A concurrent update to another field is never overwritten
//! - `KeyNotFound`, `SuffixNotFound`, codec and transport failures end the
//!   call on the attempt that produced them
//! - Running out of attempts yields `OperationFailed` with nothing written

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Connection, TxOutcome};
use crate::observability::{key_tag, Logger, SessionMetrics};

use super::codec::{self, Record};
use super::errors::{SessionError, SessionResult};

/// Default number of commit attempts per mutation
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Single-field change to a session record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMutation<'a> {
    /// Insert or overwrite a field
    Set { suffix: &'a str, payload: &'a [u8] },
    /// Remove a field that must exist
    Delete { suffix: &'a str },
}

impl FieldMutation<'_> {
    pub fn suffix(&self) -> &str {
        match self {
            FieldMutation::Set { suffix, .. } | FieldMutation::Delete { suffix } => suffix,
        }
    }

    /// Apply the change to a decoded record
    pub fn apply(&self, record: &mut Record) -> SessionResult<()> {
        match *self {
            FieldMutation::Set { suffix, payload } => {
                record.insert(suffix, payload.to_vec());
                Ok(())
            }
            FieldMutation::Delete { suffix } => record
                .remove(suffix)
                .map(|_| ())
                .ok_or(SessionError::SuffixNotFound),
        }
    }
}

/// Bounded optimistic read-modify-write over one session key
#[derive(Debug, Clone)]
pub struct OptimisticMutator {
    lifetime: Duration,
    max_retries: u32,
    metrics: Arc<SessionMetrics>,
}

impl OptimisticMutator {
    pub fn new(lifetime: Duration, max_retries: u32) -> Self {
        Self::with_metrics(lifetime, max_retries, Arc::new(SessionMetrics::new()))
    }

    /// Mutator reporting into shared counters
    pub fn with_metrics(lifetime: Duration, max_retries: u32, metrics: Arc<SessionMetrics>) -> Self {
        Self {
            lifetime,
            max_retries: max_retries.max(1),
            metrics,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Apply a single-field mutation
    ///
    /// Returns the number of attempts it took to commit.
    pub fn mutate<C: Connection + ?Sized>(
        &self,
        conn: &mut C,
        key: &str,
        mutation: FieldMutation<'_>,
    ) -> SessionResult<u32> {
        self.apply(conn, key, |record| mutation.apply(record))
    }

    /// Apply an arbitrary transform to the decoded record
    ///
    /// `transform` may run once per attempt and must not depend on state it
    /// changed in an earlier attempt.
    pub fn apply<C, F>(&self, conn: &mut C, key: &str, mut transform: F) -> SessionResult<u32>
    where
        C: Connection + ?Sized,
        F: FnMut(&mut Record) -> SessionResult<()>,
    {
        let mut step = |current: Option<Vec<u8>>| -> SessionResult<Vec<u8>> {
            let raw = current.ok_or(SessionError::KeyNotFound)?;
            let mut record = codec::decode_stored(&raw).map_err(|e| {
                let reason = e.to_string();
                Logger::error(
                    "RECORD_DECODE_FAILED",
                    &[("key", key_tag(key)), ("reason", reason.as_str())],
                );
                e
            })?;
            transform(&mut record)?;
            codec::encode(&record)
        };

        for attempt in 1..=self.max_retries {
            match conn.watch_transaction(key, self.lifetime, &mut step)? {
                TxOutcome::Committed => {
                    self.metrics.increment_commits();
                    return Ok(attempt);
                }
                TxOutcome::Conflict => {
                    self.metrics.increment_conflicts();
                    let attempt = attempt.to_string();
                    Logger::trace(
                        "MUTATION_CONFLICT",
                        &[("attempt", attempt.as_str()), ("key", key_tag(key))],
                    );
                }
            }
        }

        self.metrics.increment_retries_exhausted();
        let attempts = self.max_retries.to_string();
        Logger::warn(
            "MUTATION_RETRIES_EXHAUSTED",
            &[("attempts", attempts.as_str()), ("key", key_tag(key))],
        );

        Err(SessionError::retries_exhausted(self.max_retries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, MemoryBackend};

    const LIFETIME: Duration = Duration::from_secs(60);

    fn seeded(record: &Record) -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.put_raw("s", &codec::encode(record).unwrap(), LIFETIME).unwrap();
        backend
    }

    fn stored(backend: &MemoryBackend) -> Record {
        codec::decode(&backend.raw("s").unwrap()).unwrap()
    }

    #[test]
    fn test_set_inserts_field() {
        let backend = seeded(&Record::new());
        let mut conn = backend.connect().unwrap();
        let mutator = OptimisticMutator::new(LIFETIME, DEFAULT_MAX_RETRIES);

        let attempts = mutator
            .mutate(&mut conn, "s", FieldMutation::Set { suffix: "a", payload: b"1" })
            .unwrap();

        assert_eq!(attempts, 1);
        assert_eq!(stored(&backend).get("a"), Some(&b"1"[..]));
    }

    #[test]
    fn test_set_overwrites_field() {
        let backend = seeded(&[("a", b"old".to_vec())].into_iter().collect());
        let mut conn = backend.connect().unwrap();
        let mutator = OptimisticMutator::new(LIFETIME, DEFAULT_MAX_RETRIES);

        mutator
            .mutate(&mut conn, "s", FieldMutation::Set { suffix: "a", payload: b"new" })
            .unwrap();

        assert_eq!(stored(&backend).get("a"), Some(&b"new"[..]));
    }

    #[test]
    fn test_delete_last_field_stores_empty_value() {
        let backend = seeded(&[("a", b"1".to_vec())].into_iter().collect());
        let mut conn = backend.connect().unwrap();
        let mutator = OptimisticMutator::new(LIFETIME, DEFAULT_MAX_RETRIES);

        mutator
            .mutate(&mut conn, "s", FieldMutation::Delete { suffix: "a" })
            .unwrap();

        assert_eq!(backend.raw("s"), Some(Vec::new()));
    }

    #[test]
    fn test_delete_missing_suffix_is_not_retried() {
        let backend = seeded(&[("a", b"1".to_vec())].into_iter().collect());
        let before = backend.raw("s");
        let mut conn = backend.connect().unwrap();
        let metrics = Arc::new(SessionMetrics::new());
        let mutator = OptimisticMutator::with_metrics(LIFETIME, 5, Arc::clone(&metrics));

        let mut calls = 0;
        let result = mutator.apply(&mut conn, "s", |record| {
            calls += 1;
            FieldMutation::Delete { suffix: "b" }.apply(record)
        });

        assert_eq!(result, Err(SessionError::SuffixNotFound));
        assert_eq!(calls, 1);
        assert_eq!(backend.raw("s"), before);
        assert_eq!(metrics.snapshot().conflicts, 0);
    }

    #[test]
    fn test_absent_key_is_not_retried() {
        let backend = MemoryBackend::new();
        let mut conn = backend.connect().unwrap();
        let mutator = OptimisticMutator::new(LIFETIME, DEFAULT_MAX_RETRIES);

        let result = mutator.mutate(&mut conn, "s", FieldMutation::Set { suffix: "a", payload: b"1" });

        assert_eq!(result, Err(SessionError::KeyNotFound));
        assert!(backend.is_empty());
    }

    #[test]
    fn test_corrupted_record_is_not_retried() {
        let backend = MemoryBackend::new();
        backend.put_raw("s", b"{broken", LIFETIME).unwrap();
        let mut conn = backend.connect().unwrap();
        let mutator = OptimisticMutator::new(LIFETIME, DEFAULT_MAX_RETRIES);

        let result = mutator.mutate(&mut conn, "s", FieldMutation::Set { suffix: "a", payload: b"1" });

        assert!(matches!(result, Err(SessionError::Codec(_))));
        assert_eq!(backend.raw("s"), Some(b"{broken".to_vec()));
    }

    #[test]
    fn test_transport_error_is_not_retried() {
        let backend = seeded(&[("keep", b"x".to_vec())].into_iter().collect());
        let before = backend.raw("s");
        backend.inject_conflicts(3);
        backend.inject_transport_failures(2);
        let mut conn = backend.connect().unwrap();
        let metrics = Arc::new(SessionMetrics::new());
        let mutator = OptimisticMutator::with_metrics(LIFETIME, DEFAULT_MAX_RETRIES, Arc::clone(&metrics));

        let mut calls = 0;
        let result = mutator.apply(&mut conn, "s", |record| {
            calls += 1;
            FieldMutation::Set { suffix: "a", payload: b"1" }.apply(record)
        });

        assert!(matches!(result, Err(SessionError::Transport(_))));
        assert_eq!(calls, 1);
        assert_eq!(backend.pending_transport_failures(), 1);
        assert_eq!(backend.pending_conflicts(), 3);
        assert_eq!(backend.raw("s"), before);
        assert_eq!(metrics.snapshot().conflicts, 0);
        assert_eq!(metrics.snapshot().commits, 0);
        assert_eq!(metrics.snapshot().retries_exhausted, 0);
    }

    #[test]
    fn test_retries_through_conflicts() {
        let backend = seeded(&Record::new());
        backend.inject_conflicts(3);
        let mut conn = backend.connect().unwrap();
        let metrics = Arc::new(SessionMetrics::new());
        let mutator = OptimisticMutator::with_metrics(LIFETIME, 10, Arc::clone(&metrics));

        let attempts = mutator
            .mutate(&mut conn, "s", FieldMutation::Set { suffix: "a", payload: b"1" })
            .unwrap();

        assert_eq!(attempts, 4);
        assert_eq!(metrics.snapshot().conflicts, 3);
        assert_eq!(metrics.snapshot().commits, 1);
        assert_eq!(stored(&backend).get("a"), Some(&b"1"[..]));
    }

    #[test]
    fn test_commit_on_last_allowed_attempt() {
        let backend = seeded(&Record::new());
        backend.inject_conflicts(9);
        let mut conn = backend.connect().unwrap();
        let mutator = OptimisticMutator::new(LIFETIME, 10);

        let attempts = mutator
            .mutate(&mut conn, "s", FieldMutation::Set { suffix: "a", payload: b"1" })
            .unwrap();
        assert_eq!(attempts, 10);
    }

    #[test]
    fn test_retry_ceiling_exhausted() {
        let backend = seeded(&[("keep", b"x".to_vec())].into_iter().collect());
        let before = backend.raw("s");
        backend.inject_conflicts(10);
        let mut conn = backend.connect().unwrap();
        let metrics = Arc::new(SessionMetrics::new());
        let mutator = OptimisticMutator::with_metrics(LIFETIME, 10, Arc::clone(&metrics));

        let result = mutator.mutate(&mut conn, "s", FieldMutation::Set { suffix: "a", payload: b"1" });

        assert!(matches!(result, Err(SessionError::OperationFailed(_))));
        assert_eq!(backend.raw("s"), before);
        assert_eq!(backend.pending_conflicts(), 0);
        assert_eq!(metrics.snapshot().retries_exhausted, 1);
        assert_eq!(metrics.snapshot().commits, 0);
    }

    #[test]
    fn test_retry_rereads_concurrent_field() {
        let backend = seeded(&Record::new());
        let mut conn = backend.connect().unwrap();
        let mut intruder = backend.connect().unwrap();
        let mutator = OptimisticMutator::new(LIFETIME, DEFAULT_MAX_RETRIES);

        let mut first = true;
        let attempts = mutator
            .apply(&mut conn, "s", |record| {
                if first {
                    first = false;
                    // Another writer commits "b" between our read and commit
                    let theirs: Record = [("b", b"2".to_vec())].into_iter().collect();
                    intruder.set("s", &codec::encode(&theirs)?, LIFETIME)?;
                }
                record.insert("a", b"1".to_vec());
                Ok(())
            })
            .unwrap();

        assert_eq!(attempts, 2);
        let record = stored(&backend);
        assert_eq!(record.get("a"), Some(&b"1"[..]));
        assert_eq!(record.get("b"), Some(&b"2"[..]));
    }

    #[test]
    fn test_commit_resets_ttl() {
        let backend = MemoryBackend::new();
        backend.put_raw("s", b"", Duration::from_secs(2)).unwrap();
        let mut conn = backend.connect().unwrap();
        let mutator = OptimisticMutator::new(LIFETIME, DEFAULT_MAX_RETRIES);

        mutator
            .mutate(&mut conn, "s", FieldMutation::Set { suffix: "a", payload: b"1" })
            .unwrap();

        assert!(backend.ttl("s").unwrap() > Duration::from_secs(50));
    }

    #[test]
    fn test_zero_retries_still_attempts_once() {
        let mutator = OptimisticMutator::new(LIFETIME, 0);
        assert_eq!(mutator.max_retries(), 1);
    }
}
