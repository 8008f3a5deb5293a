//! Action registry
//!
//! Concrete per-site browser actions (marketplace listing, group joins,
//! account creation flows) are external collaborators: the scheduler and
//! worker only see the uniform `BrowserAction` contract, dispatched by
//! action name through the registry. A task whose action name is absent
//! from the registry completes the worker lifecycle without running
//! anything.

mod launch_browser;

pub use launch_browser::LaunchBrowser;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::browser::{BrowserError, BrowserPage};
use crate::events::EventSink;
use crate::task::{BrowserTask, RobotSettings};

/// One polymorphic browser capability.
///
/// On success the returned value is recorded in the result log for actions
/// that persist outcomes; on error the worker classifies the message into a
/// proxy or task disposition.
#[async_trait]
pub trait BrowserAction: Send + Sync {
    async fn run(
        &self,
        page: Arc<dyn BrowserPage>,
        task: &BrowserTask,
        settings: &RobotSettings,
        events: &EventSink,
    ) -> Result<serde_json::Value, BrowserError>;
}

/// Action-name to capability mapping.
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn BrowserAction>>,
}

impl ActionRegistry {
    /// Empty registry; the embedding application registers its actions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in `launch_browser` action.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("launch_browser", Arc::new(LaunchBrowser));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, action: Arc<dyn BrowserAction>) {
        self.actions.insert(name.into(), action);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn BrowserAction>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.actions.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.names())
            .finish()
    }
}
