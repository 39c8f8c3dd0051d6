//! Runtime configuration for a [`SubVault`](crate::SubVault).

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::network::GatewayConfig;
use crate::scan::DEFAULT_SCAN_TIMEOUT;

/// Environment variable that turns off the sync-before-lookup policy when set to `1`
pub const NO_AUTO_SYNC_ENV: &str = "SUBVAULT_NO_AUTO_SYNC";

pub const DEFAULT_SYNC_DEADLINE: Duration = Duration::from_secs(10);
pub const DEFAULT_AUTO_SYNC_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Holds `cache/`, `deltas/`, `manifest.json` and `index.redb`
    pub data_dir: PathBuf,
    /// Endpoint tiers; the primary tier is replaced by the manifest's list on open
    pub gateway: GatewayConfig,
    pub scan_timeout: Duration,
    /// Budget for an automatic sync
    pub sync_deadline: Duration,
    /// Sync again once the last sync is older than this
    pub auto_sync_interval: Duration,
    pub auto_sync: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self::new(Self::default_data_dir())
    }
}

impl VaultConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            gateway: GatewayConfig::default(),
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            sync_deadline: DEFAULT_SYNC_DEADLINE,
            auto_sync_interval: DEFAULT_AUTO_SYNC_INTERVAL,
            auto_sync: true,
        }
    }

    /// `~/.subvault`, or `./.subvault` when there is no home directory.
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".subvault")
    }

    /// Apply environment overrides (currently only [`NO_AUTO_SYNC_ENV`]).
    pub fn with_env(mut self) -> Self {
        if std::env::var(NO_AUTO_SYNC_ENV).is_ok_and(|v| v.trim() == "1") {
            self.auto_sync = false;
        }
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.data_dir.join("manifest.json")
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("index.redb")
    }
}
