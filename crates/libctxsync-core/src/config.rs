use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::io::atomic_write;

/// Name of the per-project state directory
pub const STATE_DIR: &str = ".ctxsync";

/// Project configuration stored in .ctxsync/config.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Default agent id used when none is given on the command line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub lock: LockConfig,
    pub snapshots: SnapshotConfig,
    pub triggers: TriggerConfig,
}

/// Advisory lock policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// A lock older than this is considered abandoned
    pub stale_after_ms: u64,
    /// How long a writer waits for the lock
    pub timeout_ms: u64,
    pub retry_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_after_ms: 30_000,
            timeout_ms: 5_000,
            retry_interval_ms: 100,
        }
    }
}

impl LockConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Snapshot retention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Oldest snapshots beyond this count are pruned after each new one
    pub max_snapshots: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self { max_snapshots: 50 }
    }
}

/// Which sync triggers run and how often they poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub editor_switch: bool,
    pub file_save: bool,
    pub idle: bool,
    pub git_commit: bool,
    pub editor_poll_ms: u64,
    pub file_poll_ms: u64,
    /// Quiet period after the last save before a batch is emitted
    pub debounce_ms: u64,
    pub idle_threshold_ms: u64,
    pub idle_poll_ms: u64,
    pub git_poll_ms: u64,
    /// Upper bound for one foreground-application probe
    pub command_timeout_ms: u64,
    pub watch_patterns: Vec<String>,
    pub ignore_patterns: Vec<String>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            editor_switch: true,
            file_save: true,
            idle: true,
            git_commit: true,
            editor_poll_ms: 2_000,
            file_poll_ms: 1_000,
            debounce_ms: 2_000,
            idle_threshold_ms: 300_000,
            idle_poll_ms: 10_000,
            git_poll_ms: 5_000,
            command_timeout_ms: 1_000,
            watch_patterns: vec!["**/*".to_string()],
            ignore_patterns: vec![
                ".git/**".to_string(),
                ".ctxsync/**".to_string(),
                "target/**".to_string(),
                "node_modules/**".to_string(),
            ],
        }
    }
}

impl SyncConfig {
    /// Reject settings that would make a poller spin or never fire
    pub fn validate(&self) -> Result<(), CoreError> {
        let t = &self.triggers;
        let intervals = [
            ("lock.retry_interval_ms", self.lock.retry_interval_ms),
            ("lock.stale_after_ms", self.lock.stale_after_ms),
            ("triggers.editor_poll_ms", t.editor_poll_ms),
            ("triggers.file_poll_ms", t.file_poll_ms),
            ("triggers.idle_threshold_ms", t.idle_threshold_ms),
            ("triggers.idle_poll_ms", t.idle_poll_ms),
            ("triggers.git_poll_ms", t.git_poll_ms),
            ("triggers.command_timeout_ms", t.command_timeout_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(CoreError::InvalidArgs(format!("{} must be greater than 0", name)));
            }
        }
        if self.snapshots.max_snapshots == 0 {
            return Err(CoreError::InvalidArgs(
                "snapshots.max_snapshots must be greater than 0".to_string(),
            ));
        }
        if let Some(agent) = &self.agent_id {
            if agent.trim().is_empty() || agent.contains(':') || agent.contains(',') {
                return Err(CoreError::InvalidArgs(format!("invalid agent id '{}'", agent)));
            }
        }
        Ok(())
    }
}

/// Load config from `<state_dir>/config.toml`, falling back to defaults
pub fn load_config(state_dir: &Path) -> Result<SyncConfig, CoreError> {
    let path = state_dir.join("config.toml");
    if !path.exists() {
        return Ok(SyncConfig::default());
    }
    let content = std::fs::read_to_string(&path)?;
    let config: SyncConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Save config to `<state_dir>/config.toml`
pub fn save_config(state_dir: &Path, config: &SyncConfig) -> Result<(), CoreError> {
    config.validate()?;
    std::fs::create_dir_all(state_dir)?;
    let content = toml::to_string_pretty(config)?;
    atomic_write(&state_dir.join("config.toml"), content.as_bytes())?;
    Ok(())
}
