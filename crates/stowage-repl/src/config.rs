//! Replication engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ReplError, ReplResult};
use crate::request::PushMode;

/// Engine-wide replication settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Version string compared against remotes by `check_version`.
    pub version: String,
    /// Preferred blob push mode.
    pub push_mode: PushMode,
    /// Attempts per blob push before the unit fails.
    pub push_attempts: u32,
    /// Delay between blob push attempts (ms).
    pub push_retry_delay_ms: u64,
    /// Poll interval of the storage consistency check (ms).
    pub consistency_check_interval_ms: u64,
    /// Upper bound of the storage consistency check (seconds).
    pub consistency_check_timeout_secs: u64,
    /// Concurrent block pushes for peer clusters.
    pub cluster_block_concurrency: usize,
    /// Concurrent block pushes for federation.
    pub federation_concurrency: usize,
    /// Remote repo cache entries kept for peer clusters.
    pub remote_repo_cache_capacity: usize,
    /// Remote repo cache entry lifetime for peer clusters (seconds).
    pub remote_repo_cache_ttl_secs: u64,
    /// Retry ceiling for failure and tracking records.
    pub max_retry_num: u32,
    /// Age after which exhausted records are purged (days).
    pub failed_record_retention_days: i64,
    /// Purge exhausted records during cleanup sweeps.
    pub auto_clean_expired_failed_records: bool,
    /// Page size when enumerating packages.
    pub package_page_size: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            push_mode: PushMode::Chunked,
            push_attempts: 3,
            push_retry_delay_ms: 1000,
            consistency_check_interval_ms: 1000,
            consistency_check_timeout_secs: 600,
            cluster_block_concurrency: 8,
            federation_concurrency: 8,
            remote_repo_cache_capacity: 50,
            remote_repo_cache_ttl_secs: 60,
            max_retry_num: 3,
            failed_record_retention_days: 7,
            auto_clean_expired_failed_records: true,
            package_page_size: 1000,
        }
    }
}

impl ReplicationConfig {
    /// Load from a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: ReplicationConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> ReplResult<()> {
        if self.push_attempts == 0 {
            return Err(ReplError::Config {
                msg: "push_attempts must be at least 1".to_string(),
            });
        }
        if self.cluster_block_concurrency == 0 || self.federation_concurrency == 0 {
            return Err(ReplError::Config {
                msg: "pool concurrency must be at least 1".to_string(),
            });
        }
        if self.consistency_check_interval_ms == 0 {
            return Err(ReplError::Config {
                msg: "consistency_check_interval_ms must be positive".to_string(),
            });
        }
        if self.remote_repo_cache_capacity == 0 {
            return Err(ReplError::Config {
                msg: "remote_repo_cache_capacity must be at least 1".to_string(),
            });
        }
        if self.package_page_size == 0 {
            return Err(ReplError::Config {
                msg: "package_page_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Delay between push attempts.
    pub fn push_retry_delay(&self) -> Duration {
        Duration::from_millis(self.push_retry_delay_ms)
    }

    /// Poll interval of the consistency check.
    pub fn consistency_check_interval(&self) -> Duration {
        Duration::from_millis(self.consistency_check_interval_ms)
    }

    /// Timeout of the consistency check.
    pub fn consistency_check_timeout(&self) -> Duration {
        Duration::from_secs(self.consistency_check_timeout_secs)
    }

    /// Lifetime of peer-cluster repo cache entries.
    pub fn remote_repo_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.remote_repo_cache_ttl_secs)
    }
}
