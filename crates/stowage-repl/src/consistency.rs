//! Post-push storage consistency check.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::client::RemoteReplicaClient;
use crate::config::ReplicationConfig;
use crate::model::RepositoryType;

/// Result of waiting for a blob to become visible remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyOutcome {
    /// The remote reported the blob.
    Visible {
        /// Checks issued, including the successful one.
        polls: u32,
    },
    /// The deadline passed without the blob showing up.
    TimedOut {
        /// Checks issued.
        polls: u32,
    },
}

impl ConsistencyOutcome {
    /// Whether the blob was seen.
    pub fn is_visible(&self) -> bool {
        matches!(self, ConsistencyOutcome::Visible { .. })
    }
}

/// Polls `check` at a fixed interval up to a timeout.
#[derive(Debug, Clone, Copy)]
pub struct ConsistencyChecker {
    interval: Duration,
    timeout: Duration,
}

impl ConsistencyChecker {
    /// Create a checker.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Checker using the configured interval and timeout.
    pub fn from_config(config: &ReplicationConfig) -> Self {
        Self::new(
            config.consistency_check_interval(),
            config.consistency_check_timeout(),
        )
    }

    /// Wait until `sha256` is visible. A timeout is reported, never raised.
    ///
    /// Check errors count as "not yet visible".
    pub async fn wait_until_visible(
        &self,
        client: &dyn RemoteReplicaClient,
        sha256: &str,
        storage_key: Option<&str>,
        repo_type: RepositoryType,
    ) -> ConsistencyOutcome {
        let started = Instant::now();
        let mut polls = 0u32;
        loop {
            polls += 1;
            match client.check(sha256, storage_key, repo_type).await {
                Ok(true) => {
                    debug!(sha256, polls, "blob visible on remote");
                    return ConsistencyOutcome::Visible { polls };
                }
                Ok(false) => {}
                Err(e) => debug!(sha256, error = %e, "consistency check failed"),
            }
            if started.elapsed() >= self.timeout {
                warn!(
                    sha256,
                    polls,
                    timeout_secs = self.timeout.as_secs(),
                    "blob not visible on remote before timeout"
                );
                return ConsistencyOutcome::TimedOut { polls };
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
