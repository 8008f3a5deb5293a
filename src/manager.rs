//! Browser manager
//!
//! Single-owner scheduler for browser workers. All mutable scheduling state
//! (pending tasks, proxy pool, window slots, in-progress registry, cooldown
//! timers) lives inside one actor task; everything else talks to it through
//! messages, so no disposition handler ever races another.
//!
//! Admission pairs the frontmost pending task with the frontmost pending
//! proxy whenever a window slot and a worker slot are both free. Worker
//! outcomes arrive as [`WorkerEvent`]s and are translated into requeue/drop
//! decisions plus user-facing [`ManagerEvent`]s.

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::browser::DESKTOP_WINDOW;
use crate::events::{EventSink, ManagerEvent, WorkerEvent};
use crate::proxy::ProxyPool;
use crate::slots::{WindowSlot, WindowSlotAllocator};
use crate::stats::{RunStats, RunStatsSnapshot};
use crate::task::{BrowserTask, RobotSettings};
use crate::worker::{BrowserWorker, WorkerDeps};

/// Scheduler tuning knobs.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Screen dimensions the window slot grid is generated for.
    pub screen: (u32, u32),
    /// How long a not-ready proxy rests before it is requeued.
    pub cooldown: Duration,
    /// Hard ceiling on one worker's lifetime. A worker that exceeds it is
    /// cancelled and accounted as an error so its slot and proxy are never
    /// leaked.
    pub worker_timeout: Option<Duration>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            screen: (1920, 1080),
            cooldown: Duration::from_secs(10),
            worker_timeout: Some(Duration::from_secs(15 * 60)),
        }
    }
}

/// Control messages accepted by the manager actor.
pub enum ManagerMsg {
    /// Replace the run settings (starts a fresh stats window).
    Configure(RobotSettings),
    /// Queue tasks and proxies for execution.
    AddBrowsers {
        tasks: Vec<BrowserTask>,
        proxies: Vec<String>,
    },
    /// A not-ready proxy finished its cooldown.
    CooldownElapsed(String),
    IsIdle(oneshot::Sender<bool>),
    Snapshot(oneshot::Sender<RunStatsSnapshot>),
    Shutdown,
}

/// Cloneable handle for driving the manager actor.
#[derive(Clone)]
pub struct ManagerHandle {
    tx: mpsc::UnboundedSender<ManagerMsg>,
}

impl ManagerHandle {
    pub fn configure(&self, settings: RobotSettings) {
        let _ = self.tx.send(ManagerMsg::Configure(settings));
    }

    pub fn add_browsers(&self, tasks: Vec<BrowserTask>, proxies: Vec<String>) {
        let _ = self.tx.send(ManagerMsg::AddBrowsers { tasks, proxies });
    }

    /// True when no task is pending and no worker is in flight. Proxy state
    /// (cooldowns, drops) is not considered.
    pub async fn is_idle(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(ManagerMsg::IsIdle(tx)).is_err() {
            return true;
        }
        rx.await.unwrap_or(true)
    }

    pub async fn snapshot(&self) -> Option<RunStatsSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(ManagerMsg::Snapshot(tx)).ok()?;
        rx.await.ok()
    }

    /// Cancel everything in flight and stop the actor.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ManagerMsg::Shutdown);
    }
}

/// One admitted task: its worker, proxy and window slot.
struct InProgressEntry {
    task: BrowserTask,
    raw_proxy: String,
    slot: WindowSlot,
    handle: JoinHandle<()>,
}

/// The actor state. Owned exclusively by the spawned manager task.
pub struct BrowserManager {
    settings: RobotSettings,
    config: ManagerConfig,
    deps: WorkerDeps,
    stats: Arc<RunStats>,

    tasks: VecDeque<BrowserTask>,
    proxies: ProxyPool,
    slots: WindowSlotAllocator,
    in_progress: HashMap<String, InProgressEntry>,
    cooldowns: HashMap<String, JoinHandle<()>>,

    msg_tx: mpsc::UnboundedSender<ManagerMsg>,
    worker_sink: EventSink,
    events_out: mpsc::UnboundedSender<ManagerEvent>,

    finished_emitted: bool,
    starvation_warned: bool,
}

impl BrowserManager {
    /// Spawn the manager actor. Returns the control handle and the stream of
    /// user-facing events.
    pub fn spawn(
        deps: WorkerDeps,
        config: ManagerConfig,
    ) -> (ManagerHandle, mpsc::UnboundedReceiver<ManagerEvent>) {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (worker_sink, worker_rx) = EventSink::channel();
        let (events_out, events_rx) = mpsc::unbounded_channel();

        let manager = Self {
            settings: RobotSettings::default(),
            slots: WindowSlotAllocator::new(config.screen, DESKTOP_WINDOW),
            config,
            deps,
            stats: Arc::new(RunStats::new()),
            tasks: VecDeque::new(),
            proxies: ProxyPool::new(),
            in_progress: HashMap::new(),
            cooldowns: HashMap::new(),
            msg_tx: msg_tx.clone(),
            worker_sink,
            events_out,
            finished_emitted: true,
            starvation_warned: false,
        };

        tokio::spawn(manager.run(msg_rx, worker_rx));

        (ManagerHandle { tx: msg_tx }, events_rx)
    }

    async fn run(
        mut self,
        mut msg_rx: mpsc::UnboundedReceiver<ManagerMsg>,
        mut worker_rx: mpsc::UnboundedReceiver<WorkerEvent>,
    ) {
        loop {
            tokio::select! {
                Some(msg) = msg_rx.recv() => {
                    if self.handle_msg(msg) {
                        break;
                    }
                }
                Some(event) = worker_rx.recv() => self.handle_worker_event(event),
                else => break,
            }

            self.admit();
            self.check_run_finished();
        }

        info!("Browser manager stopped");
    }

    /// Returns true when the actor should stop.
    fn handle_msg(&mut self, msg: ManagerMsg) -> bool {
        match msg {
            ManagerMsg::Configure(settings) => {
                debug!("Settings replaced: {:?}", settings);
                self.settings = settings;
                self.stats.reset();
            }
            ManagerMsg::AddBrowsers { tasks, proxies } => {
                let task_count = tasks.len();
                let mut new_proxies = 0;
                for proxy in proxies {
                    if self.proxies.add(proxy) {
                        new_proxies += 1;
                    }
                }
                self.tasks.extend(tasks);
                self.finished_emitted = false;
                self.starvation_warned = false;
                info!("Queued {} tasks, {} new proxies", task_count, new_proxies);
            }
            ManagerMsg::CooldownElapsed(raw_proxy) => {
                self.cooldowns.remove(&raw_proxy);
                debug!("Proxy cooled down, requeueing");
                self.proxies.requeue(raw_proxy);
            }
            ManagerMsg::IsIdle(reply) => {
                let idle = self.tasks.is_empty() && self.in_progress.is_empty();
                let _ = reply.send(idle);
            }
            ManagerMsg::Snapshot(reply) => {
                let _ = reply.send(self.stats.snapshot());
            }
            ManagerMsg::Shutdown => {
                info!(
                    "Shutting down: cancelling {} workers, {} cooldowns",
                    self.in_progress.len(),
                    self.cooldowns.len()
                );
                for (_, entry) in self.in_progress.drain() {
                    entry.handle.abort();
                }
                for (_, handle) in self.cooldowns.drain() {
                    handle.abort();
                }
                self.tasks.clear();
                return true;
            }
        }
        false
    }

    fn handle_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Info { task, message } => {
                self.emit(ManagerEvent::Info(format!(
                    "ℹ️ INFO {}: {}",
                    task_tag(&task),
                    message
                )));
            }
            WorkerEvent::Warning { task, message } => {
                self.emit(ManagerEvent::Warning(format!(
                    "\t\t⚠️ WARNING {}: {}",
                    task_tag(&task),
                    message
                )));
            }
            WorkerEvent::Progress { task, message, done, total } => {
                self.emit(ManagerEvent::Progress(
                    format!("💬 PROGRESS {}: {}", task_tag(&task), message),
                    [done, total],
                ));
            }
            WorkerEvent::Failed { task, message, .. } => {
                if let Some(entry) = self.retire(&task.browser_id) {
                    // The task itself is spent but the proxy did its job.
                    self.proxies.requeue(entry.raw_proxy);
                    self.stats.record_failure();
                    self.emit(ManagerEvent::Failed(format!(
                        "\t\t❗{}: {}",
                        task_tag(&task),
                        message
                    )));
                }
            }
            WorkerEvent::Error { task, message } => {
                if let Some(entry) = self.retire(&task.browser_id) {
                    // The proxy may be poisoned; it is never requeued.
                    self.proxies.forget(&entry.raw_proxy);
                    self.stats.record_error();
                    self.emit(ManagerEvent::Error(format!(
                        "\t\t❌ ERROR {}: {}",
                        task_tag(&task),
                        message
                    )));
                }
            }
            WorkerEvent::ProxyUnavailable { task, raw_proxy } => {
                if let Some(entry) = self.retire(&task.browser_id) {
                    // Task goes back to the front so it is retried next, with
                    // whatever proxy comes up; the dead proxy is dropped.
                    self.proxies.forget(&entry.raw_proxy);
                    self.tasks.push_front(entry.task);
                    self.stats.record_retry();
                    self.emit(ManagerEvent::Warning(format!(
                        "⚠️ PROXY {}: Unavailable proxy ({})",
                        task_tag(&task),
                        raw_proxy
                    )));
                }
            }
            WorkerEvent::ProxyNotReady { task, raw_proxy } => {
                if let Some(entry) = self.retire(&task.browser_id) {
                    self.tasks.push_front(entry.task);
                    self.start_cooldown(entry.raw_proxy);
                    self.stats.record_retry();
                    self.emit(ManagerEvent::Warning(format!(
                        "⚠️ PROXY {}: Could not use proxy ({}), will retry with this proxy after {}s.",
                        task_tag(&task),
                        raw_proxy,
                        self.config.cooldown.as_secs()
                    )));
                }
            }
            WorkerEvent::RequirePhoneNumber { task } => {
                if let Some(entry) = self.retire(&task.browser_id) {
                    // The paused task keeps its context alive upstream, so
                    // the proxy does not come back either.
                    self.proxies.forget(&entry.raw_proxy);
                    self.emit(ManagerEvent::RequirePhoneNumber(task));
                }
            }
            WorkerEvent::RequireOtpCode { task } => {
                if let Some(entry) = self.retire(&task.browser_id) {
                    self.proxies.forget(&entry.raw_proxy);
                    self.emit(ManagerEvent::RequireOtpCode(task));
                }
            }
            WorkerEvent::Finished { task, status, .. } => {
                // Always sent by the worker; only counts as success when no
                // disposition handler already retired the entry.
                if let Some(entry) = self.retire(&task.browser_id) {
                    self.proxies.requeue(entry.raw_proxy);
                    self.stats.record_success();
                    info!("Task for {} finished: {}", username(&task), status);
                    self.emit(ManagerEvent::TaskSucceeded(format!(
                        "✅ SUCCEED {}: {}",
                        task_tag(&task),
                        status
                    )));
                }
            }
        }
    }

    /// Pair pending tasks with pending proxies while a window slot and a
    /// worker slot are both free.
    fn admit(&mut self) {
        while self.in_progress.len() < self.settings.thread_num
            && !self.tasks.is_empty()
            && !self.proxies.pending_is_empty()
        {
            let Some(slot) = self.slots.acquire() else {
                debug!("No free window slot, admission paused");
                return;
            };

            // Both pops are guarded by the loop condition.
            let Some(mut task) = self.tasks.pop_front() else {
                self.slots.release(slot);
                return;
            };
            let Some(raw_proxy) = self.proxies.pop_front() else {
                self.tasks.push_front(task);
                self.slots.release(slot);
                return;
            };

            while task.browser_id.is_empty() || self.in_progress.contains_key(&task.browser_id) {
                task.browser_id = uuid::Uuid::new_v4().to_string();
            }

            debug!(
                "Admitting {} ({}) at slot {:?}",
                username(&task),
                task.action_name,
                slot
            );

            let handle = self.spawn_worker(task.clone(), raw_proxy.clone(), slot);
            self.in_progress.insert(
                task.browser_id.clone(),
                InProgressEntry { task, raw_proxy, slot, handle },
            );
        }
    }

    fn spawn_worker(&self, task: BrowserTask, raw_proxy: String, slot: WindowSlot) -> JoinHandle<()> {
        let worker = BrowserWorker::new(
            task.clone(),
            raw_proxy.clone(),
            self.settings.clone(),
            slot,
            self.deps.clone(),
            self.worker_sink.clone(),
        );
        let sink = self.worker_sink.clone();
        let limit = self.config.worker_timeout;

        tokio::spawn(async move {
            let run = AssertUnwindSafe(worker.run()).catch_unwind();

            let outcome = match limit {
                Some(limit) => match tokio::time::timeout(limit, run).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        // The worker future is dropped here, so its slot and
                        // proxy must be reclaimed through synthesized events.
                        sink.error(
                            &task,
                            format!("Worker exceeded {:?} without completing", limit),
                        );
                        sink.finished(&task, "TimedOut", &raw_proxy);
                        return;
                    }
                },
                None => run.await,
            };

            if let Err(panic) = outcome {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!("Worker for {} panicked: {}", username(&task), message);
                sink.error(&task, format!("Worker panicked: {}", message));
                sink.finished(&task, "Panicked", &raw_proxy);
            }
        })
    }

    /// Remove an in-progress entry and free its window slot. Every
    /// disposition handler goes through here, so double-handling the same
    /// task is a no-op.
    fn retire(&mut self, browser_id: &str) -> Option<InProgressEntry> {
        let entry = self.in_progress.remove(browser_id)?;
        self.slots.release(entry.slot);
        Some(entry)
    }

    fn start_cooldown(&mut self, raw_proxy: String) {
        let tx = self.msg_tx.clone();
        let delay = self.config.cooldown;
        let proxy = raw_proxy.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ManagerMsg::CooldownElapsed(proxy));
        });
        self.cooldowns.insert(raw_proxy, handle);
    }

    fn check_run_finished(&mut self) {
        if self.finished_emitted || !self.in_progress.is_empty() {
            return;
        }

        // Finished only once every known proxy is back in the pending queue,
        // so a proxy mid-cooldown holds the run open.
        if self.tasks.is_empty() && self.proxies.fully_returned() {
            info!("All tasks finished ({} succeeded)", self.stats.snapshot().succeeded);
            self.emit(ManagerEvent::Finished("All tasks finished!".to_string()));
            self.finished_emitted = true;
        } else if !self.tasks.is_empty()
            && self.proxies.pending_is_empty()
            && self.cooldowns.is_empty()
            && !self.starvation_warned
        {
            warn!("{} tasks pending but no usable proxies remain", self.tasks.len());
            self.emit(ManagerEvent::Warning(format!(
                "⚠️ {} tasks pending but no usable proxies remain",
                self.tasks.len()
            )));
            self.starvation_warned = true;
        }
    }

    fn emit(&self, event: ManagerEvent) {
        let _ = self.events_out.send(event);
    }
}

fn username(task: &BrowserTask) -> String {
    task.user.username.replace('\n', "")
}

/// `[uid - username](action)` identification carried by every user-facing
/// message.
fn task_tag(task: &BrowserTask) -> String {
    format!("[{} - {}]({})", task.user.uid, username(task), task.action_name)
}
