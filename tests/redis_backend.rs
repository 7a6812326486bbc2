//! Redis Backend Tests
//!
//! Run against a live server when `REDIS_ADDR` is set (`REDIS_DB` optional,
//! default 0). Without `REDIS_ADDR` every test returns immediately.

#![cfg(feature = "redis")]

use std::sync::{Arc, Barrier};
use std::thread;

use sessionkv::backend::{Backend, Command, Connection, RedisBackend, Reply, TxOutcome};
use sessionkv::{ClientConfig, SessionError, SessionKey, SessionStore};

fn config() -> Option<ClientConfig> {
    let addr = std::env::var("REDIS_ADDR").ok()?;
    let db = std::env::var("REDIS_DB")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    Some(ClientConfig::new(addr, db).with_lifetime_secs(1800))
}

// =============================================================================
// Connection Tests
// =============================================================================

/// Pipelined get and expire report value and refresh.
#[test]
fn test_pipeline_get_expire() {
    let Some(config) = config() else { return };
    let backend = RedisBackend::new(&config).unwrap();
    let mut conn = backend.connect().unwrap();
    let key = sessionkv::session::generate_session_key();

    conn.set(key.as_str(), b"", config.lifetime()).unwrap();
    let replies = conn
        .pipeline(&[
            Command::Get(key.to_string()),
            Command::Expire {
                key: key.to_string(),
                ttl: config.lifetime(),
            },
        ])
        .unwrap();

    assert_eq!(replies, vec![Reply::Value(Some(Vec::new())), Reply::Bool(true)]);
    assert_eq!(conn.del(key.as_str()).unwrap(), 1);
}

/// A write between watch and commit aborts the transaction.
#[test]
fn test_watch_detects_concurrent_write() {
    let Some(config) = config() else { return };
    let backend = RedisBackend::new(&config).unwrap();
    let mut conn = backend.connect().unwrap();
    let mut other = backend.connect().unwrap();
    let key = sessionkv::session::generate_session_key();
    let ttl = config.lifetime();

    conn.set(key.as_str(), b"a", ttl).unwrap();
    let outcome = conn
        .watch_transaction(key.as_str(), ttl, &mut |_| {
            other.set(key.as_str(), b"intruder", ttl)?;
            Ok(b"mine".to_vec())
        })
        .unwrap();

    assert_eq!(outcome, TxOutcome::Conflict);
    assert_eq!(conn.get(key.as_str()).unwrap(), Some(b"intruder".to_vec()));
    conn.del(key.as_str()).unwrap();
}

// =============================================================================
// Session Tests
// =============================================================================

/// Full session lifecycle on a live server.
#[test]
fn test_session_lifecycle() {
    let Some(config) = config() else { return };
    let store = SessionStore::open(&config).unwrap();

    let key = store.create_session().unwrap();
    assert_eq!(store.check_live(&key), Ok(true));
    assert_eq!(
        store.check_live(&SessionKey::from(format!("{}a", key))),
        Err(SessionError::KeyNotFound)
    );

    store.set(&key, "p1", br#"{"id":"123"}"#).unwrap();
    store.set(&key, "p2", br#"{"id":"234"}"#).unwrap();
    assert_eq!(store.get(&key, "p1").unwrap(), br#"{"id":"123"}"#);

    store.delete(&key, "p1").unwrap();
    assert_eq!(store.get(&key, "p1"), Err(SessionError::SuffixNotFound));
    assert_eq!(store.delete(&key, "p1"), Err(SessionError::SuffixNotFound));
    assert_eq!(store.get(&key, "p2").unwrap(), br#"{"id":"234"}"#);

    store.destroy(&key).unwrap();
    store.destroy(&key).unwrap();
    assert_eq!(store.check_live(&key), Err(SessionError::KeyNotFound));
}

/// Concurrent writers on one session keep every field.
#[test]
fn test_concurrent_writers() {
    const WRITERS: usize = 4;

    let Some(config) = config() else { return };
    let store = Arc::new(SessionStore::open(&config).unwrap());
    let key = store.create_session().unwrap();
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let store = Arc::clone(&store);
            let key = key.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.set(&key, &format!("w{}", i), b"v")
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    for i in 0..WRITERS {
        assert_eq!(store.get(&key, &format!("w{}", i)).unwrap(), b"v");
    }
    store.destroy(&key).unwrap();
}
