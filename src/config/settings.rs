use crate::error::{AidstatsError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum bulk file age before refetch: 30 days.
pub const DEFAULT_BULK_MAX_AGE_SECS: u64 = 30 * 24 * 60 * 60;
/// Bound on waiting for another download of the same dataset: 20 minutes.
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 1200;
/// Interval between lock acquisition attempts.
pub const DEFAULT_LOCK_POLL_MS: u64 = 50;

/// Cache configuration.
///
/// The base directory holds the `bulk/` and `queries/` subdirectories and may be
/// shared by several processes. Freshness and lock bounds are explicit settings
/// rather than hardcoded constants; the defaults match long-standing practice
/// for these datasets (monthly refresh, downloads that can take many minutes).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub base_dir: PathBuf,
    pub bulk_max_age_secs: u64,
    pub lock_timeout_secs: u64,
    pub lock_poll_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(".aidstats"),
            bulk_max_age_secs: DEFAULT_BULK_MAX_AGE_SECS,
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
            lock_poll_ms: DEFAULT_LOCK_POLL_MS,
        }
    }
}

impl CacheSettings {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    pub fn bulk_dir(&self) -> PathBuf {
        self.base_dir.join("bulk")
    }

    pub fn queries_dir(&self) -> PathBuf {
        self.base_dir.join("queries")
    }

    pub fn bulk_max_age(&self) -> Duration {
        Duration::from_secs(self.bulk_max_age_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn lock_poll(&self) -> Duration {
        Duration::from_millis(self.lock_poll_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_dir.as_os_str().is_empty() {
            return Err(AidstatsError::Configuration(
                "Base directory must not be empty".to_string(),
            ));
        }
        if self.lock_poll_ms == 0 {
            return Err(AidstatsError::Configuration(
                "Lock poll interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AidstatsError::Configuration(format!("Failed to read config: {}", e)))?;

        let settings: CacheSettings = toml::from_str(&contents)
            .map_err(|e| AidstatsError::Configuration(format!("Failed to parse config: {}", e)))?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| AidstatsError::Configuration(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, toml_str)
            .map_err(|e| AidstatsError::Configuration(format!("Failed to write config: {}", e)))?;

        Ok(())
    }
}
