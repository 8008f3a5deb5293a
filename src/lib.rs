//! Marketbot
//!
//! Scheduler for parallel browser automation sessions. Each session runs one
//! task under one user profile behind one resolved proxy, tiled across the
//! screen, with bounded concurrency and proxy-failure retry.

pub mod actions;
pub mod browser;
pub mod events;
pub mod locks;
pub mod manager;
pub mod proxy;
pub mod results;
pub mod slots;
pub mod stats;
pub mod task;
pub mod worker;

#[cfg(test)]
pub(crate) mod testutil;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use actions::ActionRegistry;
use browser::ChromiumLauncher;
use events::ManagerEvent;
use locks::DirLockManager;
use manager::{BrowserManager, ManagerConfig, ManagerHandle};
use proxy::HttpProxyResolver;
use results::ResultLog;
use task::RobotSettings;
use worker::WorkerDeps;

/// Application configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Proxy resolver service endpoint
    pub resolver_endpoint: String,

    /// Resolver request timeout, in seconds
    #[serde(default = "default_resolver_timeout_secs")]
    pub resolver_timeout_secs: u64,

    /// Screen dimensions for the window slot grid
    #[serde(default = "default_screen_width")]
    pub screen_width: u32,
    #[serde(default = "default_screen_height")]
    pub screen_height: u32,

    /// Proxy cooldown after a not-ready outcome, in seconds
    #[serde(default = "default_cooldown_secs")]
    pub proxy_cooldown_secs: u64,

    /// Hard per-worker lifetime ceiling, in seconds (0 = unlimited)
    #[serde(default = "default_worker_timeout_secs")]
    pub worker_timeout_secs: u64,

    /// Where the group-listing result log is written
    #[serde(default = "default_results_path")]
    pub results_path: String,

    /// Run settings applied at startup
    #[serde(default)]
    pub settings: RobotSettings,
}

fn default_resolver_timeout_secs() -> u64 { 30 }
fn default_screen_width() -> u32 { 1920 }
fn default_screen_height() -> u32 { 1080 }
fn default_cooldown_secs() -> u64 { 10 }
fn default_worker_timeout_secs() -> u64 { 15 * 60 }
fn default_results_path() -> String { "results.json".to_string() }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            resolver_endpoint: String::new(),
            resolver_timeout_secs: default_resolver_timeout_secs(),
            screen_width: default_screen_width(),
            screen_height: default_screen_height(),
            proxy_cooldown_secs: default_cooldown_secs(),
            worker_timeout_secs: default_worker_timeout_secs(),
            results_path: default_results_path(),
            settings: RobotSettings::default(),
        }
    }
}

impl AppConfig {
    /// Get config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("marketbot").join("config.json"))
    }

    /// Load config from file, falling back to defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(content) => match serde_json::from_str(&content) {
                        Ok(config) => {
                            info!("Loaded config from {:?}", path);
                            return config;
                        }
                        Err(e) => warn!("Failed to parse config file: {}", e),
                    },
                    Err(e) => warn!("Failed to read config file: {}", e),
                }
            }
        }
        Self::default()
    }

    /// Save config to file
    pub fn save(&self) {
        if let Some(path) = Self::config_path() {
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    error!("Failed to create config directory: {}", e);
                    return;
                }
            }

            match serde_json::to_string_pretty(self) {
                Ok(content) => {
                    if let Err(e) = std::fs::write(&path, content) {
                        error!("Failed to save config: {}", e);
                    } else {
                        info!("Config saved to {:?}", path);
                    }
                }
                Err(e) => error!("Failed to serialize config: {}", e),
            }
        }
    }

    fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            screen: (self.screen_width, self.screen_height),
            cooldown: Duration::from_secs(self.proxy_cooldown_secs),
            worker_timeout: match self.worker_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

/// Wire up the production collaborators and spawn the manager.
///
/// The registry starts with the built-in actions; the embedding application
/// registers its site-specific ones before queueing work.
pub fn start(
    config: &AppConfig,
    registry: ActionRegistry,
) -> Result<(ManagerHandle, mpsc::UnboundedReceiver<ManagerEvent>), reqwest::Error> {
    let resolver =
        HttpProxyResolver::new(&config.resolver_endpoint, config.resolver_timeout_secs)?;

    let deps = WorkerDeps {
        resolver: Arc::new(resolver),
        launcher: Arc::new(ChromiumLauncher::new()),
        registry: Arc::new(registry),
        dir_locks: Arc::new(DirLockManager::new()),
        results: Arc::new(ResultLog::new(&config.results_path)),
    };

    let (handle, events) = BrowserManager::spawn(deps, config.manager_config());
    handle.configure(config.settings.clone());
    Ok((handle, events))
}

/// Get log directory path (shared across modules)
pub fn log_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("marketbot").join("logs"))
}

/// Initialize logging
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if let Some(log_dir) = log_dir() {
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "marketbot.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}
