//! Session store counters
//!
//! - Counters only, monotonic
//! - Relaxed atomics; values never steer control flow

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters for one session store client
#[derive(Debug, Default)]
pub struct SessionMetrics {
    sessions_created: AtomicU64,
    sessions_destroyed: AtomicU64,
    reads: AtomicU64,
    commits: AtomicU64,
    conflicts: AtomicU64,
    retries_exhausted: AtomicU64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_sessions_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_sessions_destroyed(&self) {
        self.sessions_destroyed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a sliding read (liveness check or get)
    pub fn increment_reads(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a committed field mutation
    pub fn increment_commits(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a watch transaction that lost to a concurrent writer
    pub fn increment_conflicts(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_retries_exhausted(&self) {
        self.retries_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> SessionMetricsSnapshot {
        SessionMetricsSnapshot {
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_destroyed: self.sessions_destroyed.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            retries_exhausted: self.retries_exhausted.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`SessionMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionMetricsSnapshot {
    pub sessions_created: u64,
    pub sessions_destroyed: u64,
    pub reads: u64,
    pub commits: u64,
    pub conflicts: u64,
    pub retries_exhausted: u64,
}
