use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::queue::QueueOptions;
use crate::retry::RetryPolicy;
use crate::transfer::TransferOptions;

/// Chunk retry parameters (`[retry]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per chunk, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt in seconds; doubles afterwards.
    pub base_delay_secs: f64,
    /// Upper bound on one backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 1.0,
            max_delay_secs: 8,
        }
    }
}

/// Global configuration loaded from `~/.config/mediaq/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaqConfig {
    /// Length of one ranged chunk in bytes.
    pub chunk_size_bytes: u64,
    /// Objects smaller than this are downloaded with one sequential stream.
    pub min_parallel_bytes: u64,
    /// Chunk fetches in flight per transfer.
    pub chunk_concurrency: usize,
    /// Jobs allowed to run at once.
    pub max_concurrent_jobs: usize,
    /// Minimum time between two progress updates of one transfer.
    pub progress_interval_ms: u64,
    /// Where jobs download to; XDG cache `mediaq/work` when unset.
    pub work_dir: Option<PathBuf>,
    /// Root of the local store; XDG data `mediaq/store` when unset.
    pub store_root: Option<PathBuf>,
    pub retry: RetryConfig,
}

impl Default for MediaqConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: 512 * 1024,
            min_parallel_bytes: 10 * 1024 * 1024,
            chunk_concurrency: 4,
            max_concurrent_jobs: 3,
            progress_interval_ms: 3000,
            work_dir: None,
            store_root: None,
            retry: RetryConfig::default(),
        }
    }
}

impl MediaqConfig {
    /// Negative or NaN base delays count as zero; values too large for a
    /// `Duration` fall back to the default base delay.
    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        let base_delay = Duration::try_from_secs_f64(self.retry.base_delay_secs.max(0.0))
            .unwrap_or(defaults.base_delay);
        RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(self.retry.max_delay_secs),
        }
    }

    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            chunk_size: self.chunk_size_bytes.max(1),
            min_parallel_size: self.min_parallel_bytes,
            progress_interval: Duration::from_millis(self.progress_interval_ms),
            retry: self.retry_policy(),
        }
    }

    pub fn queue_options(&self) -> QueueOptions {
        QueueOptions {
            max_concurrent_jobs: self.max_concurrent_jobs.max(1),
            chunk_concurrency: self.chunk_concurrency.max(1),
        }
    }

    pub fn work_dir(&self) -> Result<PathBuf> {
        match &self.work_dir {
            Some(p) => Ok(p.clone()),
            None => Ok(xdg::BaseDirectories::with_prefix("mediaq")?
                .get_cache_home()
                .join("work")),
        }
    }

    pub fn store_root(&self) -> Result<PathBuf> {
        match &self.store_root {
            Some(p) => Ok(p.clone()),
            None => Ok(xdg::BaseDirectories::with_prefix("mediaq")?
                .get_data_home()
                .join("store")),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mediaq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MediaqConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = MediaqConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: MediaqConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
