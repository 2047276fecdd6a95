//! nottif-config: persisted webhook URL and cron job definitions.
//!
//! The on-disk document is JSON:
//!
//! ```json
//! {
//!   "webhook_url": "https://discord.com/api/webhooks/...",
//!   "cron_jobs": [{ "id": "...", "message": "...", "schedule": "0 9 * * *" }]
//! }
//! ```
//!
//! [`ConfigStore`] wraps the document in a single `RwLock`. Every read of the
//! webhook URL or job list and every mutation goes through that lock.

use std::ffi::OsString;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use nottif_types::CronJob;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write config {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Config directory not found")]
    NoDirFound,
}

/// Process-wide persisted state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NottifConfig {
    /// Outbound webhook target. Empty when not configured yet.
    #[serde(default)]
    pub webhook_url: String,
    /// Recurring notifications, in insertion order.
    #[serde(default)]
    pub cron_jobs: Vec<CronJob>,
}

impl NottifConfig {
    pub fn find_job(&self, id: &str) -> Option<&CronJob> {
        self.cron_jobs.iter().find(|j| j.id == id)
    }

    /// Remove a job, returning it together with the index it occupied.
    pub fn take_job(&mut self, id: &str) -> Option<(usize, CronJob)> {
        let index = self.cron_jobs.iter().position(|j| j.id == id)?;
        Some((index, self.cron_jobs.remove(index)))
    }

    /// Put a job back at a previous position (clamped to the current length).
    pub fn restore_job(&mut self, index: usize, job: CronJob) {
        let index = index.min(self.cron_jobs.len());
        self.cron_jobs.insert(index, job);
    }

    pub fn job_ids(&self) -> Vec<String> {
        self.cron_jobs.iter().map(|j| j.id.clone()).collect()
    }
}

/// Lock-protected config bound to its backing file.
pub struct ConfigStore {
    path: PathBuf,
    state: RwLock<NottifConfig>,
}

impl ConfigStore {
    /// Load the config at `path`.
    ///
    /// A missing or empty file yields an empty config which is immediately
    /// written back, so the file always exists after a successful load.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = match tokio::fs::read(&path).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        let config = match content {
            Some(bytes) if !bytes.trim_ascii().is_empty() => serde_json::from_slice(&bytes)
                .map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?,
            _ => {
                info!("Initializing empty config at {}", path.display());
                let config = NottifConfig::default();
                write_config(&path, &config).await?;
                config
            }
        };

        debug!(
            jobs = config.cron_jobs.len(),
            "Loaded config from {}",
            path.display()
        );
        Ok(Self {
            path,
            state: RwLock::new(config),
        })
    }

    /// Shared access. Many readers may hold this at once.
    pub async fn read(&self) -> RwLockReadGuard<'_, NottifConfig> {
        self.state.read().await
    }

    /// Exclusive access. The returned guard can persist what it holds.
    pub async fn write(&self) -> ConfigWriteGuard<'_> {
        ConfigWriteGuard {
            state: self.state.write().await,
            path: &self.path,
        }
    }
}

/// Write guard returned by [`ConfigStore::write`].
pub struct ConfigWriteGuard<'a> {
    state: RwLockWriteGuard<'a, NottifConfig>,
    path: &'a Path,
}

impl ConfigWriteGuard<'_> {
    /// Persist the state held by this guard without releasing the lock.
    pub async fn save(&self) -> Result<(), ConfigError> {
        write_config(self.path, &self.state).await
    }
}

impl Deref for ConfigWriteGuard<'_> {
    type Target = NottifConfig;

    fn deref(&self) -> &NottifConfig {
        &self.state
    }
}

impl DerefMut for ConfigWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut NottifConfig {
        &mut self.state
    }
}

/// Atomically replace `path` with the pretty-printed config.
///
/// The document is written to `<path>.tmp` first and then renamed over the
/// target, so readers never observe a half-written file.
pub async fn write_config(path: &Path, config: &NottifConfig) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let content = serde_json::to_vec_pretty(config)
        .map_err(|e| write_err(std::io::Error::other(e)))?;

    let mut tmp: OsString = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, content).await.map_err(write_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(write_err)?;
    Ok(())
}

/// Resolve the nottif config directory (~/.nottif/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".nottif"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the default config file path (~/.nottif/config.json).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json"))
}

/// Read a config without creating anything on disk.
///
/// Missing or empty files yield the default config.
pub fn load_config_from(path: &Path) -> Result<NottifConfig, ConfigError> {
    if !path.exists() {
        debug!("Config file not found at {}, using defaults", path.display());
        return Ok(NottifConfig::default());
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if content.trim().is_empty() {
        return Ok(NottifConfig::default());
    }
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
