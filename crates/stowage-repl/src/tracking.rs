//! Federation transfer tracking.
//!
//! A record is written before a node's bytes leave the cluster and removed
//! once the remote accepted the node's final metadata write. Whatever is left
//! after a crash or a failed unit is replayed by
//! [`FederationTrackingService::process_pending_file_transfers`].

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ReplicationConfig;
use crate::context::{ContextProvider, ReplayTarget, ReplicaContext};
use crate::error::{ReplError, ReplResult};
use crate::model::NodeInfo;
use crate::replicator::FederationReplicator;
use crate::store::{read_snapshot, write_snapshot};

/// An in-flight federation node transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederationTrackingRecord {
    /// Record id.
    pub id: String,
    /// Task key.
    pub task_key: String,
    /// Target cluster id.
    pub remote_cluster_id: String,
    /// Local project.
    pub project_id: String,
    /// Local repository.
    pub local_repo_name: String,
    /// Remote project.
    pub remote_project_id: String,
    /// Remote repository.
    pub remote_repo_name: String,
    /// Node path.
    pub node_path: String,
    /// Node id.
    pub node_id: String,
    /// A transfer for this node is running.
    pub retrying: bool,
    /// Failed replays so far.
    pub retry_count: u32,
    /// Last failure reason.
    pub failure_reason: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub last_modified_at: DateTime<Utc>,
}

impl FederationTrackingRecord {
    /// Coordinates needed to rebuild a context for this record.
    pub fn replay_target(&self) -> ReplayTarget {
        ReplayTarget {
            task_key: self.task_key.clone(),
            remote_cluster_id: self.remote_cluster_id.clone(),
            local_project_id: self.project_id.clone(),
            local_repo_name: self.local_repo_name.clone(),
            remote_project_id: Some(self.remote_project_id.clone()),
            remote_repo_name: Some(self.remote_repo_name.clone()),
        }
    }
}

/// Persistence of tracking records.
pub trait TrackingStore: Send + Sync {
    /// Insert or replace a record.
    fn save(&self, record: FederationTrackingRecord) -> ReplResult<()>;
    /// Record by id.
    fn get(&self, id: &str) -> ReplResult<Option<FederationTrackingRecord>>;
    /// Record of `node_id` under `task_key`.
    fn find_by_task_and_node(
        &self,
        task_key: &str,
        node_id: &str,
    ) -> ReplResult<Option<FederationTrackingRecord>>;
    /// Every record.
    fn list(&self) -> ReplResult<Vec<FederationTrackingRecord>>;
    /// Delete by id; `true` when a record was removed.
    fn delete(&self, id: &str) -> ReplResult<bool>;
    /// Delete every record matching `predicate`, returning the count.
    fn delete_where(&self, predicate: &dyn Fn(&FederationTrackingRecord) -> bool)
        -> ReplResult<usize>;
}

/// [`TrackingStore`] held in memory with optional bincode snapshots.
#[derive(Debug, Default)]
pub struct MemoryTrackingStore {
    records: DashMap<String, FederationTrackingRecord>,
}

impl MemoryTrackingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a snapshot file; a missing file yields an empty store.
    pub fn restore(path: &Path) -> ReplResult<Self> {
        let store = Self::new();
        for record in read_snapshot::<FederationTrackingRecord>(path)? {
            store.records.insert(record.id.clone(), record);
        }
        debug!(path = %path.display(), records = store.records.len(), "tracking store restored");
        Ok(store)
    }

    /// Write every record to `path`.
    pub fn snapshot(&self, path: &Path) -> ReplResult<()> {
        let records: Vec<FederationTrackingRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        write_snapshot(path, &records)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl TrackingStore for MemoryTrackingStore {
    fn save(&self, record: FederationTrackingRecord) -> ReplResult<()> {
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    fn get(&self, id: &str) -> ReplResult<Option<FederationTrackingRecord>> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    fn find_by_task_and_node(
        &self,
        task_key: &str,
        node_id: &str,
    ) -> ReplResult<Option<FederationTrackingRecord>> {
        Ok(self
            .records
            .iter()
            .find(|r| r.task_key == task_key && r.node_id == node_id)
            .map(|r| r.value().clone()))
    }

    fn list(&self) -> ReplResult<Vec<FederationTrackingRecord>> {
        Ok(self.records.iter().map(|r| r.value().clone()).collect())
    }

    fn delete(&self, id: &str) -> ReplResult<bool> {
        Ok(self.records.remove(id).is_some())
    }

    fn delete_where(
        &self,
        predicate: &dyn Fn(&FederationTrackingRecord) -> bool,
    ) -> ReplResult<usize> {
        let before = self.records.len();
        self.records.retain(|_, record| !predicate(record));
        Ok(before - self.records.len())
    }
}

/// Writes and clears tracking records around node transfers.
#[derive(Clone)]
pub struct FederationTracker {
    store: Arc<dyn TrackingStore>,
}

impl FederationTracker {
    /// Wrap a store.
    pub fn new(store: Arc<dyn TrackingStore>) -> Self {
        Self { store }
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn TrackingStore> {
        &self.store
    }

    /// Start tracking a transfer of `node`.
    ///
    /// An existing record for the same task and node is marked retrying
    /// instead of duplicated.
    pub fn track(
        &self,
        ctx: &ReplicaContext,
        remote_project_id: &str,
        remote_repo_name: &str,
        node: &NodeInfo,
    ) -> ReplResult<FederationTrackingRecord> {
        let now = Utc::now();
        if let Some(mut record) = self.store.find_by_task_and_node(&ctx.task.key, &node.id)? {
            record.retrying = true;
            record.last_modified_at = now;
            self.store.save(record.clone())?;
            return Ok(record);
        }
        let record = FederationTrackingRecord {
            id: Uuid::new_v4().to_string(),
            task_key: ctx.task.key.clone(),
            remote_cluster_id: ctx.cluster.id.clone(),
            project_id: ctx.local_project_id.clone(),
            local_repo_name: ctx.local_repo_name.clone(),
            remote_project_id: remote_project_id.to_string(),
            remote_repo_name: remote_repo_name.to_string(),
            node_path: node.full_path.clone(),
            node_id: node.id.clone(),
            retrying: false,
            retry_count: 0,
            failure_reason: None,
            created_at: now,
            last_modified_at: now,
        };
        self.store.save(record.clone())?;
        Ok(record)
    }

    /// Stop tracking after the remote acknowledged the node.
    pub fn untrack(&self, task_key: &str, node_id: &str) -> ReplResult<bool> {
        let removed = self
            .store
            .delete_where(&|r| r.task_key == task_key && r.node_id == node_id)?;
        Ok(removed > 0)
    }

    /// Hand a record back to the replay sweep after a failed transfer.
    pub(crate) fn release(&self, id: &str, reason: &str) -> ReplResult<()> {
        if let Some(mut record) = self.store.get(id)? {
            record.retrying = false;
            record.failure_reason = Some(reason.to_string());
            record.last_modified_at = Utc::now();
            self.store.save(record)?;
        }
        Ok(())
    }

    fn set_retrying(&self, id: &str, retrying: bool) -> ReplResult<()> {
        if let Some(mut record) = self.store.get(id)? {
            record.retrying = retrying;
            record.last_modified_at = Utc::now();
            self.store.save(record)?;
        }
        Ok(())
    }

    fn record_failure(&self, id: &str, reason: &str) -> ReplResult<()> {
        if let Some(mut record) = self.store.get(id)? {
            record.retrying = false;
            record.retry_count += 1;
            record.failure_reason = Some(reason.to_string());
            record.last_modified_at = Utc::now();
            self.store.save(record)?;
        }
        Ok(())
    }
}

/// Conditions for bulk deletion; at least one must be set.
#[derive(Debug, Clone, Default)]
pub struct TrackingDeleteConditions {
    /// Delete these ids.
    pub ids: Vec<String>,
    /// Delete records whose retry count is at least this.
    pub min_retry_count: Option<u32>,
}

/// Replays and expires tracking records.
pub struct FederationTrackingService {
    tracker: FederationTracker,
    replicator: FederationReplicator,
    contexts: Arc<dyn ContextProvider>,
    config: Arc<ReplicationConfig>,
}

impl FederationTrackingService {
    /// Create the service.
    pub fn new(
        replicator: FederationReplicator,
        contexts: Arc<dyn ContextProvider>,
        config: Arc<ReplicationConfig>,
    ) -> Self {
        Self {
            tracker: replicator.tracker().clone(),
            replicator,
            contexts,
            config,
        }
    }

    /// Records due for replay: not retrying and below the retry ceiling.
    pub fn pending_records(&self) -> ReplResult<Vec<FederationTrackingRecord>> {
        let max = self.config.max_retry_num;
        let mut records: Vec<FederationTrackingRecord> = self
            .tracker
            .store
            .list()?
            .into_iter()
            .filter(|r| !r.retrying && r.retry_count < max)
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    /// Replay every pending transfer; returns how many succeeded.
    pub async fn process_pending_file_transfers(&self) -> ReplResult<usize> {
        let pending = self.pending_records()?;
        if pending.is_empty() {
            debug!("no pending federation transfers");
            return Ok(0);
        }
        info!(pending = pending.len(), "replaying pending federation transfers");

        let mut succeeded = 0;
        for record in pending {
            match self.replay(&record).await {
                Ok(true) => succeeded += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(path = %record.node_path, error = %e, "federation transfer replay errored")
                }
            }
        }
        info!(succeeded, "federation transfer replay finished");
        Ok(succeeded)
    }

    /// Replay one record by id regardless of its retry count.
    pub async fn retry_record(&self, id: &str) -> ReplResult<bool> {
        let record = self.tracker.store.get(id)?.ok_or_else(|| ReplError::Store {
            msg: format!("tracking record {} not found", id),
        })?;
        self.replay(&record).await
    }

    async fn replay(&self, record: &FederationTrackingRecord) -> ReplResult<bool> {
        self.tracker.set_retrying(&record.id, true)?;
        match self.replay_inner(record).await {
            Ok(true) => {
                self.tracker.untrack(&record.task_key, &record.node_id)?;
                Ok(true)
            }
            Ok(false) => {
                self.tracker.record_failure(&record.id, "node transfer incomplete")?;
                Ok(false)
            }
            Err(e) => {
                warn!(path = %record.node_path, error = %e, "federation transfer replay failed");
                self.tracker.record_failure(&record.id, &e.to_string())?;
                Ok(false)
            }
        }
    }

    async fn replay_inner(&self, record: &FederationTrackingRecord) -> ReplResult<bool> {
        let ctx = self.contexts.context_for(&record.replay_target()).await?;
        let node = ctx
            .local
            .find_node_by_id(&record.project_id, &record.node_id)
            .await?
            .ok_or_else(|| ReplError::NodeNotFound {
                project_id: record.project_id.clone(),
                repo_name: record.local_repo_name.clone(),
                full_path: record.node_path.clone(),
            })?;
        self.replicator.replica_repo(&ctx).await?;
        self.replicator.replica_file(&ctx, &node).await
    }

    /// Purge records past the retry ceiling and the retention window.
    pub fn clean_expired_records(&self) -> ReplResult<usize> {
        if !self.config.auto_clean_expired_failed_records {
            debug!("tracking record cleanup disabled");
            return Ok(0);
        }
        let max = self.config.max_retry_num;
        let cutoff = Utc::now() - Duration::days(self.config.failed_record_retention_days);
        let removed = self
            .tracker
            .store
            .delete_where(&|r| r.retry_count >= max && r.last_modified_at < cutoff)?;
        info!(removed, max_retry_num = max, %cutoff, "expired tracking records cleaned");
        Ok(removed)
    }

    /// Record by id.
    pub fn find_by_id(&self, id: &str) -> ReplResult<Option<FederationTrackingRecord>> {
        self.tracker.store.get(id)
    }

    /// Records of a task.
    pub fn list_by_task(&self, task_key: &str) -> ReplResult<Vec<FederationTrackingRecord>> {
        Ok(self
            .tracker
            .store
            .list()?
            .into_iter()
            .filter(|r| r.task_key == task_key)
            .collect())
    }

    /// Bulk delete. Empty conditions are rejected.
    pub fn delete_by_conditions(&self, conditions: &TrackingDeleteConditions) -> ReplResult<usize> {
        if conditions.ids.is_empty() && conditions.min_retry_count.is_none() {
            return Err(ReplError::Store {
                msg: "at least one delete condition is required".to_string(),
            });
        }
        self.tracker.store.delete_where(&|r| {
            conditions.ids.contains(&r.id)
                || conditions.min_retry_count.is_some_and(|min| r.retry_count >= min)
        })
    }
}
