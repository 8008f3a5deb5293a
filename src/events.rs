//! Typed event payloads between workers, the manager and the embedding GUI.
//!
//! Workers never touch scheduler state: every outcome is converted to exactly
//! one `WorkerEvent` and sent over a channel before the worker terminates.
//! The manager reformats them into `ManagerEvent`s for the embedding caller.

use tokio::sync::mpsc;

use crate::task::BrowserTask;

/// Outcome and progress signals emitted by a worker (or an action through
/// its `EventSink`) while it runs one task.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Info { task: BrowserTask, message: String },
    Warning { task: BrowserTask, message: String },
    Progress { task: BrowserTask, message: String, done: u64, total: u64 },
    /// Action logic reported failure. The proxy is still usable.
    Failed { task: BrowserTask, message: String, raw_proxy: String },
    /// Unexpected error. The proxy is assumed possibly poisoned.
    Error { task: BrowserTask, message: String },
    /// Proxy permanently unusable; retry the task with a different proxy.
    ProxyUnavailable { task: BrowserTask, raw_proxy: String },
    /// Proxy transiently unusable; retry the task, cool the proxy down.
    ProxyNotReady { task: BrowserTask, raw_proxy: String },
    /// Human-in-the-loop pause points; the task is abandoned mid-run.
    RequirePhoneNumber { task: BrowserTask },
    RequireOtpCode { task: BrowserTask },
    /// Always-sent completion marker, emitted exactly once per worker after
    /// any of the above.
    Finished { task: BrowserTask, status: String, raw_proxy: String },
}

/// User-facing signals the manager forwards to the embedding GUI layer.
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    Info(String),
    Warning(String),
    Error(String),
    Failed(String),
    Progress(String, [u64; 2]),
    TaskSucceeded(String),
    /// Run-finished, emitted once per drain cycle.
    Finished(String),
    /// Pass-through pause signals; resumption is owned by the caller.
    RequirePhoneNumber(BrowserTask),
    RequireOtpCode(BrowserTask),
}

/// Cloneable sender handle given to workers and actions.
///
/// Sends are best-effort: once the manager is gone there is nobody left to
/// route the event to, so channel-closed errors are dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<WorkerEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiving end (used in tests and by
    /// the manager at startup).
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: WorkerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn info(&self, task: &BrowserTask, message: impl Into<String>) {
        self.send(WorkerEvent::Info { task: task.clone(), message: message.into() });
    }

    pub fn warning(&self, task: &BrowserTask, message: impl Into<String>) {
        self.send(WorkerEvent::Warning { task: task.clone(), message: message.into() });
    }

    pub fn progress(&self, task: &BrowserTask, message: impl Into<String>, done: u64, total: u64) {
        self.send(WorkerEvent::Progress {
            task: task.clone(),
            message: message.into(),
            done,
            total,
        });
    }

    pub fn failed(&self, task: &BrowserTask, message: impl Into<String>, raw_proxy: &str) {
        self.send(WorkerEvent::Failed {
            task: task.clone(),
            message: message.into(),
            raw_proxy: raw_proxy.to_string(),
        });
    }

    pub fn error(&self, task: &BrowserTask, message: impl Into<String>) {
        self.send(WorkerEvent::Error { task: task.clone(), message: message.into() });
    }

    pub fn proxy_unavailable(&self, task: &BrowserTask, raw_proxy: &str) {
        self.send(WorkerEvent::ProxyUnavailable {
            task: task.clone(),
            raw_proxy: raw_proxy.to_string(),
        });
    }

    pub fn proxy_not_ready(&self, task: &BrowserTask, raw_proxy: &str) {
        self.send(WorkerEvent::ProxyNotReady {
            task: task.clone(),
            raw_proxy: raw_proxy.to_string(),
        });
    }

    pub fn require_phone_number(&self, task: &BrowserTask) {
        self.send(WorkerEvent::RequirePhoneNumber { task: task.clone() });
    }

    pub fn require_otp_code(&self, task: &BrowserTask) {
        self.send(WorkerEvent::RequireOtpCode { task: task.clone() });
    }

    pub fn finished(&self, task: &BrowserTask, status: impl Into<String>, raw_proxy: &str) {
        self.send(WorkerEvent::Finished {
            task: task.clone(),
            status: status.into(),
            raw_proxy: raw_proxy.to_string(),
        });
    }
}
