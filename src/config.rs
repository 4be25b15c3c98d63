//! Configuration management.
//!
//! Config is stored at `~/.config/errstack/config.toml` and contains:
//! - where the event store lives
//! - store/cache timeouts and pool sizing
//! - retention, rolling windows and usage checkpoint cadence

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const CONFIG_DIR: &str = "errstack";
const CONFIG_FILE: &str = "config.toml";
const DB_FILE: &str = "events.sqlite";

/// A named rolling view over the most recent partitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingWindow {
    pub name: String,
    pub days: u32,
}

/// Runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the SQLite event store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// SQLite connection pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long SQLite waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Upper bound on every store and cache call made by the core.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// Partitions older than this are dropped by the retention sweep.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Payloads larger than this are counted as too big and not stored.
    #[serde(default = "default_max_event_size_bytes")]
    pub max_event_size_bytes: usize,

    /// Minimum time between periodic usage checkpoints per tenant.
    #[serde(default = "default_checkpoint_interval_secs")]
    pub checkpoint_interval_secs: u64,

    /// Window in which repeated stack changes collapse into one notification.
    #[serde(default = "default_stack_changed_debounce_secs")]
    pub stack_changed_debounce_secs: u64,

    #[serde(default = "default_true")]
    pub publish_stack_changes: bool,

    /// Named views over recent partitions. Kept last so it serializes as a
    /// trailing array of tables.
    #[serde(default = "default_rolling_windows")]
    pub rolling_windows: Vec<RollingWindow>,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
}

fn default_max_connections() -> u32 {
    4
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_operation_timeout_ms() -> u64 {
    5_000
}

fn default_retention_days() -> u32 {
    90
}

fn default_rolling_windows() -> Vec<RollingWindow> {
    vec![
        RollingWindow {
            name: "today".to_string(),
            days: 1,
        },
        RollingWindow {
            name: "last7days".to_string(),
            days: 7,
        },
    ]
}

fn default_max_event_size_bytes() -> usize {
    256 * 1024
}

fn default_checkpoint_interval_secs() -> u64 {
    300
}

fn default_stack_changed_debounce_secs() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
            retention_days: default_retention_days(),
            max_event_size_bytes: default_max_event_size_bytes(),
            checkpoint_interval_secs: default_checkpoint_interval_secs(),
            stack_changed_debounce_secs: default_stack_changed_debounce_secs(),
            publish_stack_changes: default_true(),
            rolling_windows: default_rolling_windows(),
        }
    }
}

impl Config {
    /// Load config from the default location.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).context("Failed to read config file")?;

        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save config to the default location.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&path, content).context("Failed to write config file")
    }

    /// Path of the SQLite database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }

    pub fn stack_changed_debounce(&self) -> Duration {
        Duration::from_secs(self.stack_changed_debounce_secs)
    }

    /// Get the config file path.
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }
}
