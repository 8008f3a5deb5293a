//! Browser worker
//!
//! Executes exactly one task against exactly one resolved proxy inside a
//! freshly-opened isolated browser context, then emits exactly one terminal
//! `Finished` event. All failures are converted to events; a worker never
//! propagates errors to the scheduler.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::actions::ActionRegistry;
use crate::browser::{BrowserContext, BrowserError, ContextLauncher, ContextOptions};
use crate::events::EventSink;
use crate::locks::DirLockManager;
use crate::proxy::{ProxyResolution, ProxyResolver};
use crate::results::ResultLog;
use crate::slots::WindowSlot;
use crate::task::{BrowserTask, RobotSettings, LIST_ON_GROUP_AND_SHARE};

/// Collaborators shared by all workers of a run.
#[derive(Clone)]
pub struct WorkerDeps {
    pub resolver: Arc<dyn ProxyResolver>,
    pub launcher: Arc<dyn ContextLauncher>,
    pub registry: Arc<ActionRegistry>,
    pub dir_locks: Arc<DirLockManager>,
    pub results: Arc<ResultLog>,
}

impl std::fmt::Debug for WorkerDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerDeps").finish_non_exhaustive()
    }
}

/// How an action-side error maps onto a proxy/task disposition.
enum ErrorClass {
    ProxyNotReady,
    ProxyUnavailable,
    TaskFailure,
}

fn classify_error(err: &BrowserError) -> ErrorClass {
    if matches!(err, BrowserError::Timeout(_)) {
        return ErrorClass::ProxyNotReady;
    }
    let msg = err.to_string();
    if msg.contains("ERR_PROXY_NOT_READY") || msg.contains("ERR_TIMED_OUT") {
        ErrorClass::ProxyNotReady
    } else if msg.contains("ERR_PROXY_CONNECTION_FAILED") {
        ErrorClass::ProxyUnavailable
    } else if msg.contains("ERR_ABORTED")
        || msg.contains("ERR_TOO_MANY_REDIRECTS")
        || msg.contains("net::ERR")
    {
        // Network-level errors: treat the proxy as unstable rather than the
        // task as broken.
        ErrorClass::ProxyNotReady
    } else {
        ErrorClass::TaskFailure
    }
}

/// One unit of execution: one task, one proxy, one window slot.
pub struct BrowserWorker {
    task: BrowserTask,
    raw_proxy: String,
    settings: RobotSettings,
    position: WindowSlot,
    deps: WorkerDeps,
    events: EventSink,
}

impl BrowserWorker {
    pub fn new(
        task: BrowserTask,
        raw_proxy: String,
        settings: RobotSettings,
        position: WindowSlot,
        deps: WorkerDeps,
        events: EventSink,
    ) -> Self {
        Self { task, raw_proxy, settings, position, deps, events }
    }

    /// Run the task to completion. Always emits exactly one `Finished`
    /// event, whatever path was taken.
    pub async fn run(self) {
        let task = self.task.clone();
        let raw_proxy = self.raw_proxy.clone();

        let status = self.execute().await;

        self.events.finished(&task, status, &raw_proxy);
    }

    async fn execute(&self) -> &'static str {
        let mobile_mode = self.task.effective_mobile();

        // Exclusive access to the on-disk profile for the whole run,
        // released when the guard drops on any exit path.
        let _profile_guard = self.deps.dir_locks.acquire(&self.task.user_data_dir).await;

        let proxy = match self.deps.resolver.resolve(&self.raw_proxy).await {
            ProxyResolution::Ready(params) => params,
            ProxyResolution::NotReady => {
                self.events.proxy_not_ready(&self.task, &self.raw_proxy);
                return "ProxyNotReady";
            }
            ProxyResolution::Unavailable => {
                self.events.proxy_unavailable(&self.task, &self.raw_proxy);
                return "ProxyUnavailable";
            }
            ProxyResolution::Unknown(reason) => {
                self.events
                    .error(&self.task, format!("Unknown proxy error: {}", reason));
                return "ProxyError";
            }
        };

        // Unknown action name: the lifecycle completes without running
        // anything, the finished marker still reclaims the slot.
        let Some(action) = self.deps.registry.get(&self.task.action_name) else {
            debug!(
                "No action registered for '{}', skipping {}",
                self.task.action_name, self.task.user.username
            );
            return "NoAction";
        };

        let options = ContextOptions::for_task(&self.task, mobile_mode, self.position, Some(proxy));

        let context = match self.deps.launcher.launch(options).await {
            Ok(c) => c,
            Err(e) => {
                self.emit_classified(e);
                return "LaunchFailed";
            }
        };

        info!(
            "Started worker for {} ({})",
            self.task.user.username.replace('\n', ""),
            self.task.action_name
        );

        match self.run_action(&*context, action).await {
            Ok(result) => {
                if self.task.action_name == LIST_ON_GROUP_AND_SHARE {
                    if let Err(e) = self.deps.results.append(
                        &self.task.user.username,
                        &self.task.action_name,
                        result,
                    ) {
                        self.events
                            .warning(&self.task, format!("Could not record result: {}", e));
                    }
                }
            }
            Err(e) => self.emit_classified(e),
        }

        // Humanlike pacing between consecutive runs sharing a profile.
        let delay = Duration::from_secs_f64(self.settings.delay_num * 60.0);
        if !delay.is_zero() {
            debug!("Post-task delay of {:?} for {}", delay, self.task.user.username);
            tokio::time::sleep(delay).await;
        }

        if let Err(e) = context.close().await {
            warn!("Error closing browser context: {}", e);
        }

        "Finished"
    }

    async fn run_action(
        &self,
        context: &dyn BrowserContext,
        action: Arc<dyn crate::actions::BrowserAction>,
    ) -> Result<serde_json::Value, BrowserError> {
        // First page carries a profile summary so operators can tell the
        // tiled windows apart; the action runs on its own page.
        let info_page = context.new_page().await?;
        info_page.set_content(&self.info_html()).await?;

        let page = context.new_page().await?;
        action.run(page, &self.task, &self.settings, &self.events).await
    }

    fn info_html(&self) -> String {
        let username = self.task.user.username.replace('\n', "");
        format!(
            "<html>\
             <head><title>{username}</title></head>\
             <body>\
             <h2>username: {username}</h2>\
             <p>id: {id}</p>\
             <p>uid: {uid}</p>\
             <p>user_data_dir: {udd}</p>\
             </body>\
             </html>",
            username = username,
            id = self.task.user.id.map(|i| i.to_string()).unwrap_or_default(),
            uid = self.task.user.uid,
            udd = self.task.user_data_dir,
        )
    }

    fn emit_classified(&self, err: BrowserError) {
        let msg = err.to_string();
        info!(
            "[{}] Error: {:.100}",
            self.task.user.username.replace('\n', ""),
            msg
        );
        match classify_error(&err) {
            ErrorClass::ProxyNotReady => self.events.proxy_not_ready(&self.task, &self.raw_proxy),
            ErrorClass::ProxyUnavailable => {
                self.events.proxy_unavailable(&self.task, &self.raw_proxy)
            }
            ErrorClass::TaskFailure => self.events.failed(&self.task, msg, &self.raw_proxy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventSink, WorkerEvent};
    use crate::task::SHARE_LATEST_PRODUCT;
    use crate::testutil::{drain_events, test_task, MockAction, MockLauncher, MockResolver};
    use serde_json::json;

    fn deps(resolver: MockResolver, launcher: Arc<MockLauncher>, registry: ActionRegistry) -> WorkerDeps {
        WorkerDeps {
            resolver: Arc::new(resolver),
            launcher,
            registry: Arc::new(registry),
            dir_locks: Arc::new(DirLockManager::new()),
            results: Arc::new(ResultLog::new(
                std::env::temp_dir().join(format!("marketbot-test-{}.json", uuid::Uuid::new_v4())),
            )),
        }
    }

    async fn run_worker(
        task: BrowserTask,
        resolver: MockResolver,
        launcher: Arc<MockLauncher>,
        registry: ActionRegistry,
    ) -> Vec<WorkerEvent> {
        let (sink, rx) = EventSink::channel();
        let worker = BrowserWorker::new(
            task,
            "proxy-1".into(),
            RobotSettings::default(),
            (0, 0),
            deps(resolver, launcher, registry),
            sink,
        );
        worker.run().await;
        drain_events(rx)
    }

    #[tokio::test]
    async fn success_emits_exactly_one_finished() {
        let launcher = Arc::new(MockLauncher::new());
        let mut registry = ActionRegistry::new();
        registry.register("test_action", Arc::new(MockAction::succeed(json!(true))));

        let events = run_worker(
            test_task("test_action"),
            MockResolver::always_ready(),
            launcher.clone(),
            registry,
        ).await;

        let finished: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, WorkerEvent::Finished { .. }))
            .collect();
        assert_eq!(finished.len(), 1);
        match finished[0] {
            WorkerEvent::Finished { status, raw_proxy, .. } => {
                assert_eq!(status, "Finished");
                assert_eq!(raw_proxy, "proxy-1");
            }
            _ => unreachable!(),
        }
        assert_eq!(launcher.launch_count(), 1);
        assert!(launcher.all_closed());
    }

    #[tokio::test]
    async fn not_ready_proxy_skips_launch() {
        let launcher = Arc::new(MockLauncher::new());
        let events = run_worker(
            test_task("test_action"),
            MockResolver::always_not_ready(),
            launcher.clone(),
            ActionRegistry::new(),
        ).await;

        assert!(matches!(events[0], WorkerEvent::ProxyNotReady { .. }));
        assert!(matches!(events.last(), Some(WorkerEvent::Finished { .. })));
        assert_eq!(launcher.launch_count(), 0);
    }

    #[tokio::test]
    async fn unavailable_proxy_emits_unavailable() {
        let launcher = Arc::new(MockLauncher::new());
        let events = run_worker(
            test_task("test_action"),
            MockResolver::always_unavailable(),
            launcher.clone(),
            ActionRegistry::new(),
        ).await;

        assert!(matches!(events[0], WorkerEvent::ProxyUnavailable { .. }));
        assert_eq!(launcher.launch_count(), 0);
    }

    #[tokio::test]
    async fn unknown_resolution_emits_error() {
        let launcher = Arc::new(MockLauncher::new());
        let events = run_worker(
            test_task("test_action"),
            MockResolver::always_unknown("bad response"),
            launcher.clone(),
            ActionRegistry::new(),
        ).await;

        match &events[0] {
            WorkerEvent::Error { message, .. } => assert!(message.contains("bad response")),
            other => panic!("expected Error, got {:?}", other),
        }
        match events.last() {
            Some(WorkerEvent::Finished { status, .. }) => assert_eq!(status, "ProxyError"),
            other => panic!("expected Finished, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_action_completes_without_launching() {
        let launcher = Arc::new(MockLauncher::new());
        let events = run_worker(
            test_task("no_such_action"),
            MockResolver::always_ready(),
            launcher.clone(),
            ActionRegistry::new(),
        ).await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            WorkerEvent::Finished { status, .. } => assert_eq!(status, "NoAction"),
            other => panic!("expected Finished only, got {:?}", other),
        }
        assert_eq!(launcher.launch_count(), 0);
    }

    #[tokio::test]
    async fn network_error_classified_as_proxy_not_ready() {
        let launcher = Arc::new(MockLauncher::new());
        let mut registry = ActionRegistry::new();
        registry.register(
            "test_action",
            Arc::new(MockAction::fail("net::ERR_CONNECTION_RESET at host")),
        );

        let events = run_worker(
            test_task("test_action"),
            MockResolver::always_ready(),
            launcher,
            registry,
        ).await;
        assert!(events
            .iter()
            .any(|e| matches!(e, WorkerEvent::ProxyNotReady { .. })));
    }

    #[tokio::test]
    async fn proxy_connection_failure_classified_as_unavailable() {
        let launcher = Arc::new(MockLauncher::new());
        let mut registry = ActionRegistry::new();
        registry.register(
            "test_action",
            Arc::new(MockAction::fail("ERR_PROXY_CONNECTION_FAILED")),
        );

        let events = run_worker(
            test_task("test_action"),
            MockResolver::always_ready(),
            launcher,
            registry,
        ).await;
        assert!(events
            .iter()
            .any(|e| matches!(e, WorkerEvent::ProxyUnavailable { .. })));
    }

    #[tokio::test]
    async fn plain_action_error_is_task_failure() {
        let launcher = Arc::new(MockLauncher::new());
        let mut registry = ActionRegistry::new();
        registry.register(
            "test_action",
            Arc::new(MockAction::fail("listing form selector missing")),
        );

        let events = run_worker(
            test_task("test_action"),
            MockResolver::always_ready(),
            launcher,
            registry,
        ).await;
        match events
            .iter()
            .find(|e| matches!(e, WorkerEvent::Failed { .. }))
        {
            Some(WorkerEvent::Failed { message, .. }) => {
                assert!(message.contains("selector missing"))
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn share_latest_product_launches_mobile() {
        let launcher = Arc::new(MockLauncher::new());
        let mut registry = ActionRegistry::new();
        registry.register(
            SHARE_LATEST_PRODUCT,
            Arc::new(MockAction::succeed(json!(null))),
        );

        let mut task = test_task(SHARE_LATEST_PRODUCT);
        task.is_mobile = false;
        run_worker(task, MockResolver::always_ready(), launcher.clone(), registry).await;

        let launches = launcher.launches();
        assert_eq!(launches.len(), 1);
        assert!(launches[0].is_mobile);
        assert_eq!(launches[0].viewport, crate::browser::MOBILE_WINDOW);
    }

    #[tokio::test]
    async fn group_share_result_is_recorded() {
        let launcher = Arc::new(MockLauncher::new());
        let mut registry = ActionRegistry::new();
        registry.register(
            LIST_ON_GROUP_AND_SHARE,
            Arc::new(MockAction::succeed(json!({"listed": 2}))),
        );

        let dir = tempfile::tempdir().unwrap();
        let results = Arc::new(ResultLog::new(dir.path().join("results.json")));
        let deps = WorkerDeps {
            resolver: Arc::new(MockResolver::always_ready()),
            launcher,
            registry: Arc::new(registry),
            dir_locks: Arc::new(DirLockManager::new()),
            results: results.clone(),
        };

        let (sink, rx) = EventSink::channel();
        let worker = BrowserWorker::new(
            test_task(LIST_ON_GROUP_AND_SHARE),
            "proxy-1".into(),
            RobotSettings::default(),
            (0, 0),
            deps,
            sink,
        );
        worker.run().await;
        drop(drain_events(rx));

        let content = std::fs::read_to_string(results.path()).unwrap();
        assert!(content.contains("\"listed\": 2"));
    }
}
