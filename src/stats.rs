//! Lock-free run statistics using atomic operations
//!
//! Tracks task outcomes for the current run without mutex contention.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Counters for one scheduler run, aggregated across all workers.
#[derive(Debug, Default)]
pub struct RunStats {
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub errors: AtomicU64,
    pub retries: AtomicU64,
    pub start_time: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            start_time: AtomicU64::new(now),
        }
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// A task re-queued for retry after a proxy outcome.
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Completed tasks, whatever the outcome.
    pub fn completed(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
            + self.failed.load(Ordering::Relaxed)
            + self.errors.load(Ordering::Relaxed)
    }

    /// Reset all counters for a new run.
    pub fn reset(&self) {
        self.succeeded.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.retries.store(0, Ordering::Relaxed);

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.start_time.store(now, Ordering::Relaxed);
    }

    /// Get snapshot for serialization
    pub fn snapshot(&self) -> RunStatsSnapshot {
        RunStatsSnapshot {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

/// Serializable snapshot of run stats
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatsSnapshot {
    pub succeeded: u64,
    pub failed: u64,
    pub errors: u64,
    pub retries: u64,
}
