//! Shared test doubles for the worker and scheduler tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::actions::BrowserAction;
use crate::browser::{
    BrowserContext, BrowserError, BrowserPage, ContextLauncher, ContextOptions,
};
use crate::events::{EventSink, WorkerEvent};
use crate::proxy::{ProxyParams, ProxyResolution, ProxyResolver};
use crate::task::{ActionPayload, BrowserTask, RobotSettings, UserIdentity};

pub fn test_task(action: &str) -> BrowserTask {
    BrowserTask {
        user: UserIdentity {
            id: Some(1),
            uid: "1000".into(),
            username: "alice".into(),
            mobile_ua: Some("mobile-ua".into()),
            desktop_ua: Some("desktop-ua".into()),
        },
        action_name: action.to_string(),
        payload: ActionPayload::LaunchUrl { url: "about:blank".into() },
        is_mobile: false,
        headless: true,
        user_data_dir: format!("/tmp/udd/{}", uuid::Uuid::new_v4()),
        browser_id: uuid::Uuid::new_v4().to_string(),
    }
}

pub fn ready_params() -> ProxyParams {
    ProxyParams {
        server: "http://10.0.0.1:8080".into(),
        username: None,
        password: None,
    }
}

/// Collect everything currently buffered in a worker-event channel.
pub fn drain_events(mut rx: mpsc::UnboundedReceiver<WorkerEvent>) -> Vec<WorkerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Resolver double. Scripted resolutions are consumed front-to-back across
/// all calls; once the script runs dry the default resolution applies.
pub struct MockResolver {
    script: Mutex<VecDeque<ProxyResolution>>,
    default: ProxyResolution,
    calls: AtomicUsize,
}

impl MockResolver {
    pub fn with_default(default: ProxyResolution) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always_ready() -> Self {
        Self::with_default(ProxyResolution::Ready(ready_params()))
    }

    pub fn always_not_ready() -> Self {
        Self::with_default(ProxyResolution::NotReady)
    }

    pub fn always_unavailable() -> Self {
        Self::with_default(ProxyResolution::Unavailable)
    }

    pub fn always_unknown(reason: &str) -> Self {
        Self::with_default(ProxyResolution::Unknown(reason.to_string()))
    }

    /// Queue resolutions to return before falling back to the default.
    pub fn then(self, resolution: ProxyResolution) -> Self {
        self.script.lock().push_back(resolution);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyResolver for MockResolver {
    async fn resolve(&self, _raw_proxy: &str) -> ProxyResolution {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default.clone())
    }
}

/// Launcher double handing out no-op contexts and recording every launch.
#[derive(Default)]
pub struct MockLauncher {
    launches: Mutex<Vec<ContextOptions>>,
    open_contexts: Mutex<Vec<Arc<MockContext>>>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().len()
    }

    pub fn launches(&self) -> Vec<ContextOptions> {
        self.launches.lock().clone()
    }

    pub fn all_closed(&self) -> bool {
        self.open_contexts
            .lock()
            .iter()
            .all(|c| c.closed.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl ContextLauncher for MockLauncher {
    async fn launch(
        &self,
        options: ContextOptions,
    ) -> Result<Arc<dyn BrowserContext>, BrowserError> {
        self.launches.lock().push(options);
        let context = Arc::new(MockContext::default());
        self.open_contexts.lock().push(context.clone());
        Ok(context)
    }
}

#[derive(Default)]
pub struct MockContext {
    pub closed: AtomicBool,
}

#[async_trait]
impl BrowserContext for MockContext {
    async fn new_page(&self) -> Result<Arc<dyn BrowserPage>, BrowserError> {
        Ok(Arc::new(MockPage::default()))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockPage {
    pub visited: Mutex<Vec<String>>,
}

#[async_trait]
impl BrowserPage for MockPage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.visited.lock().push(url.to_string());
        Ok(())
    }

    async fn set_content(&self, _html: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn wait_for_navigation(&self) -> Result<(), BrowserError> {
        Ok(())
    }
}

enum ActionScript {
    Succeed(Value),
    Fail(String),
    RequirePhoneNumber,
    RequireOtpCode,
}

/// Action double. Tracks how many instances run concurrently so scheduler
/// tests can assert admission bounds.
pub struct MockAction {
    script: ActionScript,
    hold: Duration,
    running: AtomicUsize,
    max_running: AtomicUsize,
    total_runs: AtomicUsize,
}

impl MockAction {
    fn with_script(script: ActionScript) -> Self {
        Self {
            script,
            hold: Duration::ZERO,
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            total_runs: AtomicUsize::new(0),
        }
    }

    pub fn succeed(value: Value) -> Self {
        Self::with_script(ActionScript::Succeed(value))
    }

    pub fn fail(message: &str) -> Self {
        Self::with_script(ActionScript::Fail(message.to_string()))
    }

    pub fn require_phone_number() -> Self {
        Self::with_script(ActionScript::RequirePhoneNumber)
    }

    pub fn require_otp_code() -> Self {
        Self::with_script(ActionScript::RequireOtpCode)
    }

    /// Keep each run in flight for `hold` before completing.
    pub fn holding(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    /// Largest number of simultaneously running instances observed.
    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn total_runs(&self) -> usize {
        self.total_runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserAction for MockAction {
    async fn run(
        &self,
        _page: Arc<dyn BrowserPage>,
        task: &BrowserTask,
        _settings: &RobotSettings,
        events: &EventSink,
    ) -> Result<Value, BrowserError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        self.total_runs.fetch_add(1, Ordering::SeqCst);

        if !self.hold.is_zero() {
            tokio::time::sleep(self.hold).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        match &self.script {
            ActionScript::Succeed(value) => Ok(value.clone()),
            ActionScript::Fail(message) => Err(BrowserError::ActionFailed(message.clone())),
            ActionScript::RequirePhoneNumber => {
                events.require_phone_number(task);
                Ok(Value::Null)
            }
            ActionScript::RequireOtpCode => {
                events.require_otp_code(task);
                Ok(Value::Null)
            }
        }
    }
}
