//! Built-in action: open the payload URL and leave the session running.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::BrowserAction;
use crate::browser::{BrowserError, BrowserPage};
use crate::events::EventSink;
use crate::task::{ActionPayload, BrowserTask, RobotSettings};

/// Navigates to the task's launch URL. Used for warming profiles and manual
/// operator inspection.
pub struct LaunchBrowser;

#[async_trait]
impl BrowserAction for LaunchBrowser {
    async fn run(
        &self,
        page: Arc<dyn BrowserPage>,
        task: &BrowserTask,
        _settings: &RobotSettings,
        events: &EventSink,
    ) -> Result<serde_json::Value, BrowserError> {
        let url = match &task.payload {
            ActionPayload::LaunchUrl { url } => url.clone(),
            other => {
                return Err(BrowserError::ActionFailed(format!(
                    "launch_browser expects a launch-url payload, got {:?}",
                    std::mem::discriminant(other)
                )));
            }
        };

        events.info(task, format!("Opening {}", url));
        page.goto(&url).await?;
        page.wait_for_navigation().await?;

        info!("Launched {} for {}", url, task.user.username);
        Ok(json!({ "url": url }))
    }
}
