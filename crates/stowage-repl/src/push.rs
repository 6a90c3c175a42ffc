//! Blob push with retry and chunked-to-whole fallback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::client::RemoteReplicaClient;
use crate::config::ReplicationConfig;
use crate::error::ReplResult;
use crate::request::{BlobPushRequest, PushMode};

/// Pushes blobs for one unit.
///
/// The push mode is unit state: once the remote rejects a chunked push every
/// later push through this pusher or any clone of it goes out whole.
#[derive(Debug, Clone)]
pub struct BlobPusher {
    mode: PushMode,
    downgraded: Arc<AtomicBool>,
    attempts: u32,
    delay: Duration,
}

impl BlobPusher {
    /// Create a pusher.
    pub fn new(mode: PushMode, attempts: u32, delay: Duration) -> Self {
        Self {
            mode,
            downgraded: Arc::new(AtomicBool::new(false)),
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Pusher using the configured mode and retry policy.
    pub fn from_config(config: &ReplicationConfig) -> Self {
        Self::new(config.push_mode, config.push_attempts, config.push_retry_delay())
    }

    /// Current push mode.
    pub fn mode(&self) -> PushMode {
        if self.downgraded.load(Ordering::Acquire) {
            PushMode::Whole
        } else {
            self.mode
        }
    }

    /// Push one blob, retrying transient failures.
    pub async fn push(
        &self,
        client: &dyn RemoteReplicaClient,
        request: &BlobPushRequest,
    ) -> ReplResult<()> {
        let mut attempt = 0u32;
        loop {
            let mode = self.mode();
            match client.push_blob(request, mode).await {
                Ok(()) => {
                    debug!(path = %request.name, sha256 = %request.sha256, ?mode, "blob pushed");
                    return Ok(());
                }
                Err(e) if mode == PushMode::Chunked && e.is_chunked_push_rejected() => {
                    warn!(
                        path = %request.name,
                        error = %e,
                        "remote rejected chunked push, falling back to whole-file push"
                    );
                    self.downgraded.store(true, Ordering::Release);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.attempts {
                        return Err(e);
                    }
                    warn!(
                        path = %request.name,
                        attempt,
                        max_attempts = self.attempts,
                        error = %e,
                        "blob push failed, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}
