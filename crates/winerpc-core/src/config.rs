//! Configuration for winerpc.
//!
//! Two layers live here: the user-editable [`Config`] read from `config.json`,
//! and associated-constant structs holding protocol limits and timeouts that are
//! not meant to be tuned per install.

use crate::error::{Result, WineRpcError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Application-level constants.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "winerpc";
    pub const DEFAULT_CONFIG_FILE: &'static str = "config.json";
    pub const DEFAULT_APP_LIST_FILE: &'static str = "apps.json";
}

/// Local IPC protocol limits and timeouts.
pub struct IpcConfig;

impl IpcConfig {
    pub const PROTOCOL_VERSION: u32 = 1;
    /// Discord probes `discord-ipc-0` through `discord-ipc-9`.
    pub const MAX_PIPE_INDEX: u8 = 10;
    pub const PIPE_NAME_PREFIX: &'static str = "discord-ipc-";
    pub const MAX_FRAME_SIZE: usize = 64 * 1024;
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
    pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
    pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
    /// Frames skipped while looking for a reply with a matching nonce.
    pub const MAX_UNRELATED_FRAMES: usize = 16;
    /// Small image shown next to the game icon.
    pub const WINE_LOGO_URL: &'static str =
        "https://static.wikia.nocookie.net/logopedia/images/8/87/Wine_2008.png";
}

/// Main loop cadence and reconnect backoff defaults.
pub struct LoopConfig;

impl LoopConfig {
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
    pub const MIN_POLL_INTERVAL_MS: u64 = 100;
    pub const DEFAULT_RECONNECT_INITIAL_MS: u64 = 2000;
    pub const DEFAULT_RECONNECT_MAX_MS: u64 = 60_000;
}

/// Plugin supervisor limits.
pub struct PluginConfig;

impl PluginConfig {
    pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 3000;
    /// Grace period for exit hooks of tasks that had to be aborted.
    pub const ABORT_GRACE: Duration = Duration::from_millis(250);
}

/// User configuration loaded from `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Discord application (client) id used in the handshake.
    pub app_id: String,

    /// Path of the JSON app registry.
    #[serde(default = "default_app_list_path")]
    pub app_list_path: PathBuf,

    /// Names of the plugins to start, in order.
    #[serde(default)]
    pub plugins: Vec<String>,

    #[serde(default = "default_poll_interval_ms", alias = "pollIntervalMs")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_reconnect_initial_ms", alias = "reconnectInitialMs")]
    pub reconnect_initial_ms: u64,

    #[serde(default = "default_reconnect_max_ms", alias = "reconnectMaxMs")]
    pub reconnect_max_ms: u64,

    #[serde(
        default = "default_plugin_shutdown_timeout_ms",
        alias = "pluginShutdownTimeoutMs"
    )]
    pub plugin_shutdown_timeout_ms: u64,

    /// Show the running Wine version as the small image caption.
    #[serde(default = "default_true", alias = "showWineVersion")]
    pub show_wine_version: bool,

    /// Only match apps while a wineserver is running.
    #[serde(default, alias = "requireWineServer")]
    pub require_wine_server: bool,
}

fn default_app_list_path() -> PathBuf {
    PathBuf::from(AppConfig::DEFAULT_APP_LIST_FILE)
}

fn default_poll_interval_ms() -> u64 {
    LoopConfig::DEFAULT_POLL_INTERVAL_MS
}

fn default_reconnect_initial_ms() -> u64 {
    LoopConfig::DEFAULT_RECONNECT_INITIAL_MS
}

fn default_reconnect_max_ms() -> u64 {
    LoopConfig::DEFAULT_RECONNECT_MAX_MS
}

fn default_plugin_shutdown_timeout_ms() -> u64 {
    PluginConfig::DEFAULT_SHUTDOWN_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Create a config with defaults for everything but the client id.
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_list_path: default_app_list_path(),
            plugins: Vec::new(),
            poll_interval_ms: default_poll_interval_ms(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            plugin_shutdown_timeout_ms: default_plugin_shutdown_timeout_ms(),
            show_wine_version: true,
            require_wine_server: false,
        }
    }

    /// Load and validate a config file.
    ///
    /// A relative `app_list_path` is resolved against the config file's
    /// directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| WineRpcError::io_with_path(e, path))?;

        let mut config: Config = serde_json::from_str(&content).map_err(|e| WineRpcError::Json {
            message: format!("Failed to parse config from {}: {}", path.display(), e),
            source: Some(e),
        })?;

        if config.app_list_path.is_relative() {
            if let Some(parent) = path.parent() {
                config.app_list_path = parent.join(&config.app_list_path);
            }
        }

        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Check invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.app_id.trim().is_empty() {
            return Err(WineRpcError::Config {
                message: "app_id must not be empty".to_string(),
            });
        }

        if self.reconnect_initial_ms == 0 || self.reconnect_max_ms < self.reconnect_initial_ms {
            return Err(WineRpcError::Config {
                message: format!(
                    "invalid reconnect backoff: initial {}ms, max {}ms",
                    self.reconnect_initial_ms, self.reconnect_max_ms
                ),
            });
        }

        Ok(())
    }

    /// Poll interval, clamped to a sane minimum.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(LoopConfig::MIN_POLL_INTERVAL_MS))
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    pub fn plugin_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.plugin_shutdown_timeout_ms)
    }
}
