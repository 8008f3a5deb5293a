//! Browser context abstraction
//!
//! The worker builds a `ContextOptions` for its task and opens an isolated
//! context through a `ContextLauncher`. The traits keep the scheduler and
//! worker independent of the concrete browser backend.

use std::sync::Arc;

use async_trait::async_trait;

use super::BrowserError;
use crate::proxy::ProxyParams;
use crate::slots::WindowSlot;
use crate::task::BrowserTask;

/// Desktop window dimensions (width, height).
pub const DESKTOP_WINDOW: (u32, u32) = (960, 538);

/// Mobile window dimensions (width, height).
pub const MOBILE_WINDOW: (u32, u32) = (375, 562);

/// Common scale factor so tiled windows stay readable.
pub const DEVICE_SCALE_FACTOR: f64 = 0.68;

/// Parameters for one isolated browser context.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub user_data_dir: String,
    pub user_agent: Option<String>,
    pub headless: bool,
    /// Viewport and screen size, mode-dependent.
    pub viewport: (u32, u32),
    pub is_mobile: bool,
    pub has_touch: bool,
    pub device_scale_factor: f64,
    /// Window position assigned by the slot allocator.
    pub window_position: WindowSlot,
    /// Shown in the window title so operators can tell sessions apart.
    pub window_title: String,
    pub proxy: Option<ProxyParams>,
}

impl ContextOptions {
    /// Build options for a task in the given mode at the given slot.
    pub fn for_task(
        task: &BrowserTask,
        mobile_mode: bool,
        position: WindowSlot,
        proxy: Option<ProxyParams>,
    ) -> Self {
        let viewport = if mobile_mode { MOBILE_WINDOW } else { DESKTOP_WINDOW };
        let title = if task.user.username.is_empty() {
            "Unknown User".to_string()
        } else {
            task.user.username.replace('\n', "")
        };

        Self {
            user_data_dir: task.user_data_dir.clone(),
            user_agent: task.user_agent().map(str::to_string),
            headless: task.headless,
            viewport,
            is_mobile: mobile_mode,
            has_touch: mobile_mode,
            device_scale_factor: DEVICE_SCALE_FACTOR,
            window_position: position,
            window_title: title,
            proxy,
        }
    }

    /// Extra Chrome arguments: window placement, identification and
    /// anti-automation-detection flags.
    pub fn chrome_args(&self) -> Vec<String> {
        let mut args = vec![
            "--disable-blink-features=AutomationControlled".to_string(),
            format!("--app-name=Chromium - {}", self.window_title),
            format!("--window-position={},{}", self.window_position.0, self.window_position.1),
            format!("--window-size={},{}", self.viewport.0, self.viewport.1),
        ];
        if let Some(ref proxy) = self.proxy {
            args.push(format!("--proxy-server={}", proxy.server));
        }
        args
    }
}

/// One page inside a context. Concrete actions drive their DOM steps
/// through this handle; only the navigation surface matters to the core.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;
    async fn set_content(&self, html: &str) -> Result<(), BrowserError>;
    async fn wait_for_navigation(&self) -> Result<(), BrowserError>;
}

/// One isolated browser context bound to a profile directory.
#[async_trait]
pub trait BrowserContext: Send + Sync {
    async fn new_page(&self) -> Result<Arc<dyn BrowserPage>, BrowserError>;
    async fn close(&self) -> Result<(), BrowserError>;
}

/// Opens browser contexts. Implemented by the chromium backend and by test
/// doubles.
#[async_trait]
pub trait ContextLauncher: Send + Sync {
    async fn launch(&self, options: ContextOptions) -> Result<Arc<dyn BrowserContext>, BrowserError>;
}
