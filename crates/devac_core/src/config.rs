//! Configuration types for devac.

use crate::error::{DevacError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Workspace configuration, loaded from `.devac/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Partition lock timing.
    #[serde(default)]
    pub lock: LockConfig,

    /// Query surface limits.
    #[serde(default)]
    pub query: QueryConfig,

    /// Hub federation settings.
    #[serde(default)]
    pub hub: HubConfig,
}

impl Config {
    /// Load configuration from `<devac_root>/config.toml`.
    ///
    /// A missing file yields defaults; a malformed one is an error.
    pub fn load(devac_root: &Path) -> Result<Self> {
        let path = devac_root.join("config.toml");
        if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| DevacError::Config(format!("failed to read config: {}", e)))?;
            toml::from_str(&content)
                .map_err(|e| DevacError::Config(format!("failed to parse config: {}", e)))
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to `<devac_root>/config.toml`.
    pub fn save(&self, devac_root: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DevacError::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(devac_root.join("config.toml"), content)
            .map_err(|e| DevacError::Config(format!("failed to write config: {}", e)))?;
        Ok(())
    }
}

/// Partition lock timing.
///
/// A legitimate write must finish within `stale_after_secs`, or a
/// concurrent writer may reclaim the lock mid-write: wasteful but
/// harmless, since publication is atomic either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Terminal acquisition timeout in milliseconds (default: 30000).
    pub timeout_ms: u64,

    /// First backoff delay in milliseconds (default: 50). Doubles per
    /// retry up to `max_delay_ms`.
    pub initial_delay_ms: u64,

    /// Backoff ceiling in milliseconds (default: 2000).
    pub max_delay_ms: u64,

    /// Age beyond which a marker is stale regardless of holder liveness
    /// (default: 60).
    pub stale_after_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            initial_delay_ms: 50,
            max_delay_ms: 2_000,
            stale_after_secs: 60,
        }
    }
}

impl LockConfig {
    /// Terminal timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Initial backoff delay as a Duration.
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Backoff ceiling as a Duration.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Query surface limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Default page size for symbol queries (default: 50).
    pub default_limit: usize,

    /// Hard ceiling on requested page size (default: 500). Requests above
    /// this are rejected as invalid, not clamped.
    pub max_limit: usize,

    /// Result cap for call-graph traversal (default: 200).
    pub call_graph_cap: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 500,
            call_graph_cap: 200,
        }
    }
}

/// Hub federation settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HubConfig {
    /// Override for the hub database path. Defaults to
    /// `~/.devac/hub.db` when unset.
    pub db_path: Option<PathBuf>,
}

impl HubConfig {
    /// Resolves the hub database path, honoring the override.
    pub fn resolve_db_path(&self) -> PathBuf {
        if let Some(path) = &self.db_path {
            return path.clone();
        }
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        home.join(".devac").join("hub.db")
    }
}
