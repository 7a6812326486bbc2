//! Observability for the session store
//!
//! - Structured JSON logging with a process-wide minimum severity
//! - Per-client operation counters
//!
//! Observability never changes the outcome of an operation.

mod logger;
mod metrics;

pub use logger::{key_tag, min_severity, Logger, Severity, LOG_LEVEL_ENV};
pub use metrics::{SessionMetrics, SessionMetricsSnapshot};
