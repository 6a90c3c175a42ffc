//! Durable record of failed replication units.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::ReplayTarget;
use crate::error::{ReplError, ReplResult};
use crate::store::{read_snapshot, write_snapshot};

/// Kind of unit a failure record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    /// A node path.
    Node,
    /// A package version.
    PackageVersion,
}

/// The unit that failed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailedObject {
    /// A node, by path.
    Node {
        /// Node path.
        full_path: String,
    },
    /// A package version.
    PackageVersion {
        /// Package key.
        package_key: String,
        /// Version name.
        version: String,
    },
}

impl FailedObject {
    /// Object type of this unit.
    pub fn object_type(&self) -> ObjectType {
        match self {
            FailedObject::Node { .. } => ObjectType::Node,
            FailedObject::PackageVersion { .. } => ObjectType::PackageVersion,
        }
    }
}

/// One failed unit awaiting retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Record id.
    pub id: String,
    /// Task key.
    pub task_key: String,
    /// Target cluster id.
    pub remote_cluster_id: String,
    /// Local project.
    pub local_project_id: String,
    /// Local repository.
    pub local_repo_name: String,
    /// Remote project.
    pub remote_project_id: Option<String>,
    /// Remote repository.
    pub remote_repo_name: Option<String>,
    /// Failed unit.
    pub object: FailedObject,
    /// Last failure reason.
    pub failure_reason: String,
    /// Failed retries so far.
    pub retry_count: u32,
    /// A retry is in progress.
    pub retrying: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub last_modified_at: DateTime<Utc>,
}

impl FailureRecord {
    /// Object type of the failed unit.
    pub fn object_type(&self) -> ObjectType {
        self.object.object_type()
    }

    /// Coordinates needed to rebuild a context for this record.
    pub fn replay_target(&self) -> ReplayTarget {
        ReplayTarget {
            task_key: self.task_key.clone(),
            remote_cluster_id: self.remote_cluster_id.clone(),
            local_project_id: self.local_project_id.clone(),
            local_repo_name: self.local_repo_name.clone(),
            remote_project_id: self.remote_project_id.clone(),
            remote_repo_name: self.remote_repo_name.clone(),
        }
    }
}

/// Persistence of failure records.
pub trait FailureStore: Send + Sync {
    /// Insert or replace a record.
    fn save(&self, record: FailureRecord) -> ReplResult<()>;
    /// Record by id.
    fn get(&self, id: &str) -> ReplResult<Option<FailureRecord>>;
    /// Every record.
    fn list(&self) -> ReplResult<Vec<FailureRecord>>;
    /// Delete by id; `true` when a record was removed.
    fn delete(&self, id: &str) -> ReplResult<bool>;
    /// Delete every record matching `predicate`, returning the count.
    fn delete_where(&self, predicate: &dyn Fn(&FailureRecord) -> bool) -> ReplResult<usize>;
}

/// [`FailureStore`] held in memory with optional bincode snapshots.
#[derive(Debug, Default)]
pub struct MemoryFailureStore {
    records: DashMap<String, FailureRecord>,
}

impl MemoryFailureStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a snapshot file; a missing file yields an empty store.
    pub fn restore(path: &Path) -> ReplResult<Self> {
        let store = Self::new();
        for record in read_snapshot::<FailureRecord>(path)? {
            store.records.insert(record.id.clone(), record);
        }
        debug!(path = %path.display(), records = store.records.len(), "failure store restored");
        Ok(store)
    }

    /// Write every record to `path`.
    pub fn snapshot(&self, path: &Path) -> ReplResult<()> {
        let records: Vec<FailureRecord> = self.records.iter().map(|r| r.value().clone()).collect();
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

impl FailureStore for MemoryFailureStore {
    fn save(&self, record: FailureRecord) -> ReplResult<()> {
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    fn get(&self, id: &str) -> ReplResult<Option<FailureRecord>> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    fn list(&self) -> ReplResult<Vec<FailureRecord>> {
        Ok(self.records.iter().map(|r| r.value().clone()).collect())
    }

    fn delete(&self, id: &str) -> ReplResult<bool> {
        Ok(self.records.remove(id).is_some())
    }

    fn delete_where(&self, predicate: &dyn Fn(&FailureRecord) -> bool) -> ReplResult<usize> {
        let before = self.records.len();
        self.records.retain(|_, record| !predicate(record));
        Ok(before - self.records.len())
    }
}

/// Conditions for bulk deletion; at least one must be set.
#[derive(Debug, Clone, Default)]
pub struct FailureDeleteConditions {
    /// Delete these ids.
    pub ids: Vec<String>,
    /// Delete records whose retry count is at least this.
    pub min_retry_count: Option<u32>,
}

/// Records, updates and queries failure records.
#[derive(Clone)]
pub struct FailureRecorder {
    store: Arc<dyn FailureStore>,
}

impl FailureRecorder {
    /// Wrap a store.
    pub fn new(store: Arc<dyn FailureStore>) -> Self {
        Self { store }
    }

    /// Record a failed unit.
    ///
    /// With `existing_id` pointing at a stored record the reason is replaced
    /// and the retry count incremented; otherwise a new record starts at zero.
    pub fn record_failure(
        &self,
        target: &ReplayTarget,
        object: FailedObject,
        reason: &str,
        existing_id: Option<&str>,
    ) -> ReplResult<FailureRecord> {
        let now = Utc::now();
        if let Some(mut record) = existing_id.map(|id| self.store.get(id)).transpose()?.flatten() {
            record.failure_reason = reason.to_string();
            record.retry_count += 1;
            record.retrying = false;
            record.last_modified_at = now;
            self.store.save(record.clone())?;
            debug!(id = %record.id, retry_count = record.retry_count, "failure record updated");
            return Ok(record);
        }

        let record = FailureRecord {
            id: Uuid::new_v4().to_string(),
            task_key: target.task_key.clone(),
            remote_cluster_id: target.remote_cluster_id.clone(),
            local_project_id: target.local_project_id.clone(),
            local_repo_name: target.local_repo_name.clone(),
            remote_project_id: target.remote_project_id.clone(),
            remote_repo_name: target.remote_repo_name.clone(),
            object,
            failure_reason: reason.to_string(),
            retry_count: 0,
            retrying: false,
            created_at: now,
            last_modified_at: now,
        };
        self.store.save(record.clone())?;
        info!(id = %record.id, task_key = %record.task_key, object = ?record.object, reason, "failure recorded");
        Ok(record)
    }

    /// Records due for retry: not retrying and below `max_retry_num`.
    pub fn records_for_retry(&self, max_retry_num: u32) -> ReplResult<Vec<FailureRecord>> {
        let mut records: Vec<FailureRecord> = self
            .store
            .list()?
            .into_iter()
            .filter(|r| !r.retrying && r.retry_count < max_retry_num)
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    /// Set the retrying flag, optionally counting a retry.
    pub fn set_retrying(&self, id: &str, retrying: bool, increment: bool) -> ReplResult<()> {
        let mut record = self.require(id)?;
        record.retrying = retrying;
        if increment {
            record.retry_count += 1;
        }
        record.last_modified_at = Utc::now();
        self.store.save(record)
    }

    /// Store a retry failure: new reason, one more retry, no longer retrying.
    pub fn record_retry_failure(&self, id: &str, reason: &str) -> ReplResult<()> {
        let mut record = self.require(id)?;
        record.failure_reason = reason.to_string();
        record.retry_count += 1;
        record.retrying = false;
        record.last_modified_at = Utc::now();
        self.store.save(record)
    }

    /// Record by id.
    pub fn find_by_id(&self, id: &str) -> ReplResult<Option<FailureRecord>> {
        self.store.get(id)
    }

    /// Record of `object` under `task_key`, if any.
    pub fn find_by_object(
        &self,
        task_key: &str,
        object: &FailedObject,
    ) -> ReplResult<Option<FailureRecord>> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .find(|r| r.task_key == task_key && &r.object == object))
    }

    /// Records of a task.
    pub fn list_by_task(&self, task_key: &str) -> ReplResult<Vec<FailureRecord>> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter(|r| r.task_key == task_key)
            .collect())
    }

    /// Delete one record.
    pub fn delete(&self, id: &str) -> ReplResult<bool> {
        self.store.delete(id)
    }

    /// Delete every record of a task.
    pub fn delete_by_task(&self, task_key: &str) -> ReplResult<usize> {
        self.store.delete_where(&|r| r.task_key == task_key)
    }

    /// Bulk delete. Empty conditions are rejected so nothing is wiped by accident.
    pub fn delete_by_conditions(&self, conditions: &FailureDeleteConditions) -> ReplResult<usize> {
        if conditions.ids.is_empty() && conditions.min_retry_count.is_none() {
            return Err(ReplError::Store {
                msg: "at least one delete condition is required".to_string(),
            });
        }
        self.store.delete_where(&|r| {
            conditions.ids.contains(&r.id)
                || conditions.min_retry_count.is_some_and(|min| r.retry_count >= min)
        })
    }

    /// Purge records that exhausted their retries and were last touched before the window.
    pub fn clean_expired(&self, max_retry_num: u32, retention_days: i64) -> ReplResult<usize> {
        let cutoff = Utc::now() - Duration::days(retention_days);
        let removed = self
            .store
            .delete_where(&|r| r.retry_count >= max_retry_num && r.last_modified_at < cutoff)?;
        info!(removed, max_retry_num, %cutoff, "expired failure records cleaned");
        Ok(removed)
    }

    fn require(&self, id: &str) -> ReplResult<FailureRecord> {
        self.store.get(id)?.ok_or_else(|| ReplError::Store {
            msg: format!("failure record {} not found", id),
        })
    }
}
