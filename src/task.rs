//! Task and settings types
//!
//! A `BrowserTask` is one unit of per-user browser automation work, produced
//! by the upstream planner and consumed exactly once by a worker.

use serde::{Deserialize, Serialize};

/// Action that is always executed in mobile mode, whatever the task flag says.
pub const SHARE_LATEST_PRODUCT: &str = "share_latest_product";

/// Action whose results are appended to the persistent result log.
pub const LIST_ON_GROUP_AND_SHARE: &str = "list_on_group_and_share";

/// Identity of the platform account a task runs under.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: Option<i64>,
    pub uid: String,
    pub username: String,
    /// User agent strings captured for this account, per mode.
    pub mobile_ua: Option<String>,
    pub desktop_ua: Option<String>,
}

/// Action-specific payload, dispatched by action name through the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActionPayload {
    SellListing {
        title: String,
        description: String,
        image_paths: Vec<String>,
    },
    CreateAccount {
        first_name: String,
        surname: String,
        birth_day: String,
        gender: u8,
        password: String,
        phone_number: String,
    },
    LaunchUrl {
        url: String,
    },
}

/// One unit of per-user browser automation work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserTask {
    pub user: UserIdentity,
    pub action_name: String,
    pub payload: ActionPayload,
    pub is_mobile: bool,
    pub headless: bool,
    /// On-disk browser profile directory. Never opened by two workers at once.
    pub user_data_dir: String,
    /// Unique id within the in-progress set; reassigned on collision.
    pub browser_id: String,
}

impl BrowserTask {
    /// Mobile/desktop mode for this task. `share_latest_product` forces
    /// mobile mode regardless of the explicit flag.
    pub fn effective_mobile(&self) -> bool {
        self.is_mobile || self.action_name == SHARE_LATEST_PRODUCT
    }

    /// User agent matching the effective mode, if one is known.
    pub fn user_agent(&self) -> Option<&str> {
        if self.effective_mobile() {
            self.user.mobile_ua.as_deref()
        } else {
            self.user.desktop_ua.as_deref()
        }
    }
}

/// Process-wide run settings, replaced wholesale when a new run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotSettings {
    pub is_mobile: bool,
    pub headless: bool,
    /// Worker task cap.
    pub thread_num: usize,
    /// Group-count target for group actions.
    pub group_num: u32,
    /// Post-task delay in minutes (humanlike pacing between runs on a profile).
    pub delay_num: f64,
    pub group_file_path: String,
}

impl Default for RobotSettings {
    fn default() -> Self {
        Self {
            is_mobile: false,
            headless: false,
            thread_num: 8,
            group_num: 0,
            delay_num: 0.0,
            group_file_path: String::new(),
        }
    }
}
