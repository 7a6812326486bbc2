//! # In-Memory Backend
//!
//! A process-local key-value store with the same observable behavior the
//! session protocol relies on from a real server:
//! - expirations are whole seconds, measured on a monotonic clock
//! - every write, expiration reset or delete bumps the key's version, and a
//!   watch transaction commits only if the version it read is still current
//! - pipelined commands run one at a time, so other clients may interleave
//! - expired entries are dropped when their key is touched, and swept from
//!   the whole map every [`SWEEP_INTERVAL`] writes
//!
//! Test hooks let callers force commit conflicts or transport failures,
//! expire a key between the two halves of a pipeline, move the clock
//! forward, or refuse connections.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use super::{ttl_secs, Backend, Command, Connection, Reply, TxOutcome, WatchTransform};
use crate::session::{SessionError, SessionResult};

/// Writes between full sweeps of expired entries
pub const SWEEP_INTERVAL: u64 = 64;

/// In-process store shared by every connection it hands out
///
/// Cloning yields another handle to the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    state: RwLock<State>,
    pending_conflicts: AtomicU32,
    pending_failures: AtomicU32,
    expiry_race: AtomicBool,
    unavailable: AtomicBool,
    open_connections: AtomicUsize,
}

#[derive(Debug)]
struct State {
    entries: HashMap<String, Entry>,
    next_version: u64,
    skew: Duration,
}

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
    version: u64,
}

impl Default for State {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next_version: 1,
            skew: Duration::ZERO,
        }
    }
}

impl State {
    fn now(&self) -> Instant {
        Instant::now() + self.skew
    }

    fn live(&self, key: &str) -> Option<&Entry> {
        let now = self.now();
        self.entries.get(key).filter(|e| e.expires_at > now)
    }

    fn purge(&mut self, key: &str) {
        let now = self.now();
        if self.entries.get(key).is_some_and(|e| e.expires_at <= now) {
            self.entries.remove(key);
        }
    }

    fn sweep(&mut self) {
        let now = self.now();
        self.entries.retain(|_, e| e.expires_at > now);
    }

    fn bump(&mut self) -> u64 {
        let version = self.next_version;
        self.next_version += 1;
        version
    }

    fn expires_at(&self, ttl: Duration) -> SessionResult<Instant> {
        self.now()
            .checked_add(Duration::from_secs(ttl_secs(ttl)))
            .ok_or_else(|| SessionError::Transport("invalid expire time".to_string()))
    }

    fn put(&mut self, key: &str, value: Vec<u8>, ttl: Duration) -> SessionResult<()> {
        let expires_at = self.expires_at(ttl)?;
        let version = self.bump();
        if version % SWEEP_INTERVAL == 0 {
            self.sweep();
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at,
                version,
            },
        );
        Ok(())
    }

    fn expire(&mut self, key: &str, ttl: Duration) -> SessionResult<bool> {
        let expires_at = self.expires_at(ttl)?;
        self.purge(key);
        let version = self.bump();
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = expires_at;
                entry.version = version;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn del(&mut self, key: &str) -> u64 {
        self.purge(key);
        match self.entries.remove(key) {
            Some(_) => 1,
            None => 0,
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` watch transactions report a conflict
    pub fn inject_conflicts(&self, n: u32) {
        self.shared.pending_conflicts.store(n, Ordering::SeqCst);
    }

    /// Conflicts injected but not yet consumed
    pub fn pending_conflicts(&self) -> u32 {
        self.shared.pending_conflicts.load(Ordering::SeqCst)
    }

    /// Make the next `n` pipelines or watch commits fail with a transport error
    ///
    /// A failing pipeline runs none of its commands. A failing watch commit
    /// runs the transform and writes nothing.
    pub fn inject_transport_failures(&self, n: u32) {
        self.shared.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Transport failures injected but not yet consumed
    pub fn pending_transport_failures(&self) -> u32 {
        self.shared.pending_failures.load(Ordering::SeqCst)
    }

    /// Delete the key read by the next pipelined `Get`, right after the read
    pub fn inject_expiry_race(&self) {
        self.shared.expiry_race.store(true, Ordering::SeqCst);
    }

    /// Refuse (or accept again) new connections
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Connections handed out and not yet dropped
    pub fn open_connections(&self) -> usize {
        self.shared.open_connections.load(Ordering::SeqCst)
    }

    /// Move the store clock forward
    pub fn advance_clock(&self, by: Duration) {
        self.write_state().skew += by;
    }

    /// Raw stored value of a live key
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.read_state().live(key).map(|e| e.value.clone())
    }

    /// Write a raw value, bypassing the session protocol
    pub fn put_raw(&self, key: &str, value: &[u8], ttl: Duration) -> SessionResult<()> {
        self.write_state().put(key, value.to_vec(), ttl)
    }

    /// Remaining time to live of a live key
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let state = self.read_state();
        let now = state.now();
        state.live(key).map(|e| e.expires_at.saturating_duration_since(now))
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let state = self.read_state();
        let now = state.now();
        state.entries.values().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        self.shared.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        self.shared.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Backend for MemoryBackend {
    type Conn = MemoryConnection;

    fn connect(&self) -> SessionResult<MemoryConnection> {
        if self.shared.unavailable.load(Ordering::SeqCst) {
            return Err(SessionError::Transport("connection refused".to_string()));
        }
        self.shared.open_connections.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            shared: Arc::clone(&self.shared),
        })
    }
}

/// Connection to a [`MemoryBackend`]
#[derive(Debug)]
pub struct MemoryConnection {
    shared: Arc<Shared>,
}

impl MemoryConnection {
    fn read(&self) -> SessionResult<RwLockReadGuard<'_, State>> {
        self.shared
            .state
            .read()
            .map_err(|_| SessionError::Transport("Lock poisoned".to_string()))
    }

    fn write(&self) -> SessionResult<RwLockWriteGuard<'_, State>> {
        self.shared
            .state
            .write()
            .map_err(|_| SessionError::Transport("Lock poisoned".to_string()))
    }

    fn take_conflict(&self) -> bool {
        self.shared
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn take_failure(&self) -> SessionResult<()> {
        let failed = self
            .shared
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(SessionError::Transport("connection reset".to_string()));
        }
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.shared.open_connections.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Connection for MemoryConnection {
    fn get(&mut self, key: &str) -> SessionResult<Option<Vec<u8>>> {
        Ok(self.read()?.live(key).map(|e| e.value.clone()))
    }

    fn set(&mut self, key: &str, value: &[u8], ttl: Duration) -> SessionResult<()> {
        self.write()?.put(key, value.to_vec(), ttl)
    }

    fn expire(&mut self, key: &str, ttl: Duration) -> SessionResult<bool> {
        self.write()?.expire(key, ttl)
    }

    fn del(&mut self, key: &str) -> SessionResult<u64> {
        Ok(self.write()?.del(key))
    }

    fn pipeline(&mut self, commands: &[Command]) -> SessionResult<Vec<Reply>> {
        self.take_failure()?;

        let mut replies = Vec::with_capacity(commands.len());

        for command in commands {
            let reply = match command {
                Command::Get(key) => {
                    let value = self.get(key)?;
                    if value.is_some() && self.shared.expiry_race.swap(false, Ordering::SeqCst) {
                        self.write()?.entries.remove(key);
                    }
                    Reply::Value(value)
                }
                Command::Set { key, value, ttl } => {
                    self.set(key, value, *ttl)?;
                    Reply::Ok
                }
                Command::Expire { key, ttl } => Reply::Bool(self.expire(key, *ttl)?),
                Command::Del(key) => Reply::Count(self.del(key)?),
            };
            replies.push(reply);
        }

        Ok(replies)
    }

    fn watch_transaction(
        &mut self,
        key: &str,
        ttl: Duration,
        transform: &mut WatchTransform<'_>,
    ) -> SessionResult<TxOutcome> {
        let (current, watched) = {
            let state = self.read()?;
            match state.live(key) {
                Some(entry) => (Some(entry.value.clone()), Some(entry.version)),
                None => (None, None),
            }
        };

        let value = transform(current)?;

        let mut state = self.write()?;
        self.take_failure()?;
        if self.take_conflict() {
            return Ok(TxOutcome::Conflict);
        }
        if state.live(key).map(|e| e.version) != watched {
            return Ok(TxOutcome::Conflict);
        }
        state.put(key, value, ttl)?;

        Ok(TxOutcome::Committed)
    }
}
