//! Persistent result log
//!
//! Append-only JSON array file recording the outcome of group-listing runs.
//! Read-modify-append-write under a file-level lock; not atomic across
//! processes.

use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One recorded action outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEntry {
    pub username: String,
    pub action: String,
    pub result: serde_json::Value,
    pub timestamp: String,
}

/// Append-only result file (`results.json`).
#[derive(Debug)]
pub struct ResultLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ResultLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    /// Append one entry, preserving whatever is already in the file. A
    /// corrupt or missing file starts a fresh array rather than failing the
    /// task that produced the result.
    pub fn append(&self, username: &str, action: &str, result: serde_json::Value) -> std::io::Result<()> {
        let _guard = self.lock.lock();

        let mut all: Vec<ResultEntry> = match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Result log {} is corrupt ({}), starting over", self.path.display(), e);
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };

        all.push(ResultEntry {
            username: username.to_string(),
            action: action.to_string(),
            result,
            timestamp: Local::now().to_rfc3339(),
        });

        let serialized = serde_json::to_string_pretty(&all)?;
        std::fs::write(&self.path, serialized)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
