//! Chromium-backed context launcher
//!
//! Launches one Chrome/Chromium instance per context via chromiumoxide,
//! with the profile directory, window placement and proxy from the task's
//! `ContextOptions`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BrowserContext, BrowserError, BrowserPage, ContextLauncher, ContextOptions};

/// Find a Chrome/Chromium executable on the system.
fn find_chrome() -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = if cfg!(target_os = "windows") {
        let mut paths = vec![
            PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
            PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        ];
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            paths.push(PathBuf::from(format!(r"{}\Google\Chrome\Application\chrome.exe", local)));
        }
        paths
    } else if cfg!(target_os = "macos") {
        vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
        ]
    } else {
        vec![
            PathBuf::from("/usr/bin/chromium"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/google-chrome-stable"),
        ]
    };

    candidates.into_iter().find(|p| p.exists())
}

/// Launcher that opens real Chromium contexts.
#[derive(Debug, Default)]
pub struct ChromiumLauncher {
    /// Explicit executable path; auto-detected when unset.
    chrome_path: Option<PathBuf>,
}

impl ChromiumLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chrome_path(path: impl Into<PathBuf>) -> Self {
        Self { chrome_path: Some(path.into()) }
    }

    fn build_config(&self, options: &ContextOptions) -> Result<BrowserConfig, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .user_data_dir(&options.user_data_dir)
            .window_size(options.viewport.0, options.viewport.1)
            .viewport(Viewport {
                width: options.viewport.0,
                height: options.viewport.1,
                device_scale_factor: Some(options.device_scale_factor),
                emulating_mobile: options.is_mobile,
                has_touch: options.has_touch,
                is_landscape: false,
            })
            .args(options.chrome_args());

        builder = if options.headless {
            builder.new_headless_mode()
        } else {
            builder.with_head()
        };

        if let Some(path) = self.chrome_path.clone().or_else(find_chrome) {
            builder = builder.chrome_executable(path);
        }

        builder.build().map_err(BrowserError::LaunchFailed)
    }
}

#[async_trait]
impl ContextLauncher for ChromiumLauncher {
    async fn launch(&self, options: ContextOptions) -> Result<Arc<dyn BrowserContext>, BrowserError> {
        if let Some(ref proxy) = options.proxy {
            if proxy.username.is_some() {
                // Chrome cannot take inline proxy credentials; the resolver
                // service is expected to hand out IP-allowlisted endpoints.
                warn!("Proxy {} carries credentials Chrome will not send", proxy.server);
            }
        }

        let config = self.build_config(&options)?;

        info!(
            "Launching context for profile {} at {:?} (headless: {})",
            options.user_data_dir, options.window_position, options.headless
        );

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
            debug!("Browser handler loop ended");
        });

        Ok(Arc::new(ChromiumContext {
            browser: Mutex::new(browser),
            user_agent: options.user_agent,
            handler_task,
        }))
    }
}

/// One running Chromium instance bound to a profile directory.
pub struct ChromiumContext {
    browser: Mutex<Browser>,
    user_agent: Option<String>,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl BrowserContext for ChromiumContext {
    async fn new_page(&self) -> Result<Arc<dyn BrowserPage>, BrowserError> {
        let browser = self.browser.lock().await;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::PageError(e.to_string()))?;

        if let Some(ref ua) = self.user_agent {
            page.set_user_agent(ua.as_str())
                .await
                .map_err(|e| BrowserError::PageError(e.to_string()))?;
        }

        Ok(Arc::new(ChromiumPage { page }))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let mut browser = self.browser.lock().await;
        browser
            .close()
            .await
            .map_err(|e| BrowserError::ConnectionLost(e.to_string()))?;
        self.handler_task.abort();
        Ok(())
    }
}

struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.page
            .goto(url)
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))
    }

    async fn set_content(&self, html: &str) -> Result<(), BrowserError> {
        self.page
            .set_content(html)
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::PageError(e.to_string()))
    }

    async fn wait_for_navigation(&self) -> Result<(), BrowserError> {
        self.page
            .wait_for_navigation()
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::Timeout(e.to_string()))
    }
}
