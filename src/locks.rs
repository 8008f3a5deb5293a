//! Per-profile directory locks
//!
//! Two workers must never open the same on-disk browser profile at the same
//! time. The registry hands out scoped guards keyed by directory path; the
//! lock is released when the guard drops, on every exit path.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Scoped acquisition token for one user-data directory.
pub type DirLockGuard = OwnedMutexGuard<()>;

/// Registry of per-directory mutual-exclusion locks.
#[derive(Debug, Default)]
pub struct DirLockManager {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DirLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `path`. The returned guard releases the
    /// lock when dropped.
    pub async fn acquire(&self, path: &str) -> DirLockGuard {
        let lock = self
            .locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        debug!("Acquiring profile lock for {}", path);
        lock.lock_owned().await
    }

    /// Number of directories the registry has seen.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
