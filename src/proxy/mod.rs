//! Proxy pool and resolution
//!
//! Raw proxy identifiers are opaque strings handed to the scheduler. Workers
//! resolve them into usable connection parameters through an external
//! resolver service; the scheduler only routes tokens and reacts to the
//! worker's outcome signal.

mod resolver;

pub use resolver::HttpProxyResolver;

use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Usable proxy connection parameters returned by the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyParams {
    /// Proxy server URL, e.g. `http://10.0.0.1:8080`.
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Outcome of resolving one raw proxy identifier.
#[derive(Debug, Clone)]
pub enum ProxyResolution {
    /// Proxy is usable with these parameters.
    Ready(ProxyParams),
    /// Not ready yet; retry later after a cooldown.
    NotReady,
    /// Permanently unavailable; drop the proxy, retry the task elsewhere.
    Unavailable,
    /// Malformed or unexpected resolver response.
    Unknown(String),
}

/// External proxy resolver, invoked inside a worker.
#[async_trait]
pub trait ProxyResolver: Send + Sync {
    async fn resolve(&self, raw_proxy: &str) -> ProxyResolution;
}

/// Deduplicated set of known raw proxies plus the pending queue the
/// scheduler consumes from.
///
/// Invariant: a proxy is pending, held by an in-flight worker, or cooling
/// down; `fully_returned` holds exactly when nothing is in flight or cooling.
#[derive(Debug, Default)]
pub struct ProxyPool {
    known: HashSet<String>,
    pending: VecDeque<String>,
}

impl ProxyPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw proxy id. Only identifiers not already known are appended
    /// to the pending queue. Returns true if the id was new.
    pub fn add(&mut self, raw_proxy: String) -> bool {
        if self.known.contains(&raw_proxy) {
            return false;
        }
        self.known.insert(raw_proxy.clone());
        self.pending.push_back(raw_proxy);
        true
    }

    /// Take the frontmost pending proxy.
    pub fn pop_front(&mut self) -> Option<String> {
        self.pending.pop_front()
    }

    /// Return a proxy to the back of the pending queue, unless it is already
    /// queued (no duplicate entries).
    pub fn requeue(&mut self, raw_proxy: String) {
        if !self.pending.contains(&raw_proxy) {
            self.pending.push_back(raw_proxy);
        }
    }

    /// Drop a proxy entirely: it leaves the known set, never returns to
    /// pending, and may be re-added later as if new.
    pub fn forget(&mut self, raw_proxy: &str) {
        self.known.remove(raw_proxy);
        self.pending.retain(|p| p != raw_proxy);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn known_len(&self) -> usize {
        self.known.len()
    }

    /// True when every known proxy has returned to the pending queue, i.e.
    /// none is in flight or cooling down.
    pub fn fully_returned(&self) -> bool {
        self.pending.len() == self.known.len()
    }
}
