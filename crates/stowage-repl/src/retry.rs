//! Replays failed units and expires the ones that ran out of retries.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::ReplicationConfig;
use crate::context::{ContextProvider, ReplicaContext};
use crate::error::{ReplError, ReplResult};
use crate::failure::{FailedObject, FailureRecord, FailureRecorder};
use crate::replicator::Replicator;

/// Outcome of one retry sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetrySummary {
    /// Records picked up.
    pub attempted: usize,
    /// Records replayed successfully and deleted.
    pub succeeded: usize,
    /// Records that failed again.
    pub failed: usize,
}

/// Bounded retry of failure records through one replicator.
pub struct RetryService {
    recorder: FailureRecorder,
    replicator: Replicator,
    contexts: Arc<dyn ContextProvider>,
    config: Arc<ReplicationConfig>,
}

impl RetryService {
    /// Create the service.
    pub fn new(
        recorder: FailureRecorder,
        replicator: Replicator,
        contexts: Arc<dyn ContextProvider>,
        config: Arc<ReplicationConfig>,
    ) -> Self {
        Self {
            recorder,
            replicator,
            contexts,
            config,
        }
    }

    /// Recorder the service reads from.
    pub fn recorder(&self) -> &FailureRecorder {
        &self.recorder
    }

    /// Replay every record below the retry ceiling that is not already being retried.
    pub async fn retry_failed_records(&self) -> ReplResult<RetrySummary> {
        let records = self.recorder.records_for_retry(self.config.max_retry_num)?;
        let mut summary = RetrySummary {
            attempted: records.len(),
            ..Default::default()
        };
        if records.is_empty() {
            debug!("no failure records due for retry");
            return Ok(summary);
        }
        info!(due = records.len(), "retrying failed units");

        for record in records {
            if self.retry(&record).await? {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
        }
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "failure retry sweep finished"
        );
        Ok(summary)
    }

    /// Replay one record by id regardless of its retry count.
    pub async fn retry_record(&self, id: &str) -> ReplResult<bool> {
        let record = self.recorder.find_by_id(id)?.ok_or_else(|| ReplError::Store {
            msg: format!("failure record {} not found", id),
        })?;
        self.retry(&record).await
    }

    async fn retry(&self, record: &FailureRecord) -> ReplResult<bool> {
        self.recorder.set_retrying(&record.id, true, false)?;
        let reason = match self.replay(record).await {
            Ok(true) => {
                self.recorder.delete(&record.id)?;
                debug!(id = %record.id, object = ?record.object, "failed unit replayed");
                return Ok(true);
            }
            Ok(false) => "unit replay incomplete".to_string(),
            Err(e) if e.is_fatal() => {
                error!(id = %record.id, error = %e, "failed unit replay hit a fatal error");
                e.to_string()
            }
            Err(e) => {
                warn!(id = %record.id, object = ?record.object, error = %e, "failed unit replay failed");
                e.to_string()
            }
        };
        self.recorder.record_retry_failure(&record.id, &reason)?;
        Ok(false)
    }

    async fn replay(&self, record: &FailureRecord) -> ReplResult<bool> {
        let ctx = self.contexts.context_for(&record.replay_target()).await?;
        self.replicator.replica_repo(&ctx).await?;
        match &record.object {
            FailedObject::Node { full_path } => self.replay_node(&ctx, full_path).await,
            FailedObject::PackageVersion {
                package_key,
                version,
            } => self.replay_version(&ctx, package_key, version).await,
        }
    }

    async fn replay_node(&self, ctx: &ReplicaContext, full_path: &str) -> ReplResult<bool> {
        let node = ctx
            .local
            .find_node(&ctx.local_project_id, &ctx.local_repo_name, full_path)
            .await?
            .ok_or_else(|| ReplError::NodeNotFound {
                project_id: ctx.local_project_id.clone(),
                repo_name: ctx.local_repo_name.clone(),
                full_path: full_path.to_string(),
            })?;
        if node.folder {
            return self.replicator.replica_dir(ctx, &node).await;
        }
        self.replicator.replica_file(ctx, &node).await
    }

    async fn replay_version(
        &self,
        ctx: &ReplicaContext,
        package_key: &str,
        version_name: &str,
    ) -> ReplResult<bool> {
        let not_found = || ReplError::PackageNotFound {
            package_key: package_key.to_string(),
            version: Some(version_name.to_string()),
        };
        let package = ctx
            .local
            .find_package(&ctx.local_project_id, &ctx.local_repo_name, package_key)
            .await?
            .ok_or_else(not_found)?;
        let version = ctx
            .local
            .find_version(&ctx.local_project_id, &ctx.local_repo_name, package_key, version_name)
            .await?
            .ok_or_else(not_found)?;
        self.replicator
            .replica_package_version(ctx, &package, &version)
            .await
    }

    /// Purge exhausted records past the retention window, when enabled.
    pub fn clean_expired_records(&self) -> ReplResult<usize> {
        if !self.config.auto_clean_expired_failed_records {
            debug!("failure record cleanup disabled");
            return Ok(0);
        }
        self.recorder.clean_expired(
            self.config.max_retry_num,
            self.config.failed_record_retention_days,
        )
    }
}
