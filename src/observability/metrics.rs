//! Metrics registry
//!
//! - Counters only
//! - Monotonic increase
//! - Reset only on process start

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters shared by the accept loop and every session.
///
/// Relaxed ordering throughout; counters are not used for synchronization.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    sessions_accepted: AtomicU64,
    sessions_closed: AtomicU64,
    sessions_failed: AtomicU64,
    sessions_rejected: AtomicU64,
    accept_failures: AtomicU64,
    records_committed: AtomicU64,
    bytes_committed: AtomicU64,
    records_evicted: AtomicU64,
    snapshot_bytes_sent: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_sessions_accepted(&self) {
        self.sessions_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_sessions_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_sessions_failed(&self) {
        self.sessions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_sessions_rejected(&self) {
        self.sessions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_accept_failures(&self) {
        self.accept_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one committed record of `bytes` bytes
    pub fn record_commit(&self, bytes: u64) {
        self.records_committed.fetch_add(1, Ordering::Relaxed);
        self.bytes_committed.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn increment_records_evicted(&self) {
        self.records_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_snapshot_bytes_sent(&self, bytes: u64) {
        self.snapshot_bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_accepted: self.sessions_accepted.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            sessions_failed: self.sessions_failed.load(Ordering::Relaxed),
            sessions_rejected: self.sessions_rejected.load(Ordering::Relaxed),
            accept_failures: self.accept_failures.load(Ordering::Relaxed),
            records_committed: self.records_committed.load(Ordering::Relaxed),
            bytes_committed: self.bytes_committed.load(Ordering::Relaxed),
            records_evicted: self.records_evicted.load(Ordering::Relaxed),
            snapshot_bytes_sent: self.snapshot_bytes_sent.load(Ordering::Relaxed),
        }
    }

    /// Current counters as a JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A point-in-time copy of all counters
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    pub sessions_accepted: u64,
    pub sessions_closed: u64,
    pub sessions_failed: u64,
    pub sessions_rejected: u64,
    pub accept_failures: u64,
    pub records_committed: u64,
    pub bytes_committed: u64,
    pub records_evicted: u64,
    pub snapshot_bytes_sent: u64,
}
