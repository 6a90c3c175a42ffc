//! Per-run execution context.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

use crate::cache::{RemoteRepoCache, RepoCacheKey};
use crate::client::{LocalDataManager, RemoteReplicaClient};
use crate::config::ReplicationConfig;
use crate::error::ReplResult;
use crate::filter::PackageFilter;
use crate::model::{ClusterInfo, RepositoryDetail, RepositoryType};
use crate::replicator::ReplicatorKind;
use crate::transfer::{BlockTransferPool, TransferPools};

/// Task-level switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSetting {
    /// Copy node metadata along with node records.
    pub include_metadata: bool,
    /// Poll the remote store until a pushed blob is visible.
    pub storage_consistency_check: bool,
    /// Package name rules for external targets.
    pub package_rules: Vec<String>,
    /// Version name rules for external targets.
    pub version_rules: Vec<String>,
}

impl Default for TaskSetting {
    fn default() -> Self {
        Self {
            include_metadata: true,
            storage_consistency_check: false,
            package_rules: Vec::new(),
            version_rules: Vec::new(),
        }
    }
}

/// Identity and settings of a replication task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaTaskInfo {
    /// Unique task key.
    pub key: String,
    /// Task name; federation tasks are named `prefix/<federation id>/...`.
    pub name: String,
    /// Task switches.
    pub setting: TaskSetting,
}

impl ReplicaTaskInfo {
    /// Create a task with default settings.
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            setting: TaskSetting::default(),
        }
    }
}

/// Local and remote repository a run replicates between.
///
/// Remote identifiers are absent for external targets without projects or repositories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaTarget {
    /// Local project.
    pub local_project_id: String,
    /// Local repository.
    pub local_repo_name: String,
    /// Local repository type.
    pub local_repo_type: RepositoryType,
    /// Remote project.
    pub remote_project_id: Option<String>,
    /// Remote repository.
    pub remote_repo_name: Option<String>,
    /// Remote repository type; defaults to the local type.
    pub remote_repo_type: Option<RepositoryType>,
}

impl ReplicaTarget {
    /// Same project and repository name on both sides.
    pub fn mirrored(project_id: &str, repo_name: &str, repo_type: RepositoryType) -> Self {
        Self {
            local_project_id: project_id.to_string(),
            local_repo_name: repo_name.to_string(),
            local_repo_type: repo_type,
            remote_project_id: Some(project_id.to_string()),
            remote_repo_name: Some(repo_name.to_string()),
            remote_repo_type: Some(repo_type),
        }
    }
}

/// Long-lived collaborators shared by every context of a driver.
#[derive(Clone)]
pub struct ReplicaServices {
    /// Local data reader.
    pub local: Arc<dyn LocalDataManager>,
    /// Engine configuration.
    pub config: Arc<ReplicationConfig>,
    /// Block transfer pools.
    pub pools: TransferPools,
    /// Remote repo cache for peer clusters.
    pub cluster_repo_cache: Arc<RemoteRepoCache>,
    /// Remote repo cache for federation.
    pub federation_repo_cache: Arc<RemoteRepoCache>,
}

impl ReplicaServices {
    /// Build pools and caches from `config`.
    pub fn new(local: Arc<dyn LocalDataManager>, config: ReplicationConfig) -> Self {
        use crate::cache::EvictionPolicy;

        let pools = TransferPools::new(config.cluster_block_concurrency, config.federation_concurrency);
        let cluster_repo_cache = Arc::new(RemoteRepoCache::new(EvictionPolicy::Bounded {
            capacity: config.remote_repo_cache_capacity,
            ttl: config.remote_repo_cache_ttl(),
        }));
        let federation_repo_cache = Arc::new(RemoteRepoCache::new(EvictionPolicy::Unbounded));
        Self {
            local,
            config: Arc::new(config),
            pools,
            cluster_repo_cache,
            federation_repo_cache,
        }
    }
}

/// Everything one replication run needs.
pub struct ReplicaContext {
    /// Task being executed.
    pub task: ReplicaTaskInfo,
    /// Local project.
    pub local_project_id: String,
    /// Local repository.
    pub local_repo_name: String,
    /// Local repository type.
    pub local_repo_type: RepositoryType,
    /// Remote project; `None` for external targets.
    pub remote_project_id: Option<String>,
    /// Remote repository; `None` for external targets.
    pub remote_repo_name: Option<String>,
    /// Remote repository type.
    pub remote_repo_type: RepositoryType,
    /// Target cluster.
    pub cluster: ClusterInfo,
    /// Remote RPC client.
    pub client: Arc<dyn RemoteReplicaClient>,
    /// Local data reader.
    pub local: Arc<dyn LocalDataManager>,
    /// Engine configuration.
    pub config: Arc<ReplicationConfig>,
    /// Cache of remote repositories for this topology.
    pub repo_cache: Arc<RemoteRepoCache>,
    /// Block transfer pool for this topology.
    pub pool: Arc<BlockTransferPool>,
    /// Compiled package rules.
    pub filter: PackageFilter,
    remote_repo: OnceLock<RepositoryDetail>,
}

impl ReplicaContext {
    /// Build a context for `kind`, selecting its pool and cache.
    pub fn new(
        task: ReplicaTaskInfo,
        cluster: ClusterInfo,
        client: Arc<dyn RemoteReplicaClient>,
        target: ReplicaTarget,
        services: &ReplicaServices,
        kind: ReplicatorKind,
    ) -> ReplResult<Self> {
        let filter = PackageFilter::new(&task.setting.package_rules, &task.setting.version_rules)?;
        let (repo_cache, pool) = match kind {
            ReplicatorKind::Federation => (
                Arc::clone(&services.federation_repo_cache),
                Arc::clone(&services.pools.federation),
            ),
            _ => (
                Arc::clone(&services.cluster_repo_cache),
                Arc::clone(&services.pools.cluster),
            ),
        };
        Ok(Self {
            task,
            remote_repo_type: target.remote_repo_type.unwrap_or(target.local_repo_type),
            local_project_id: target.local_project_id,
            local_repo_name: target.local_repo_name,
            local_repo_type: target.local_repo_type,
            remote_project_id: target.remote_project_id.filter(|s| !s.is_empty()),
            remote_repo_name: target.remote_repo_name.filter(|s| !s.is_empty()),
            cluster,
            client,
            local: Arc::clone(&services.local),
            config: Arc::clone(&services.config),
            repo_cache,
            pool,
            filter,
            remote_repo: OnceLock::new(),
        })
    }

    /// Remote project and repository, when the target has them.
    pub fn remote_coordinates(&self) -> Option<(&str, &str)> {
        match (&self.remote_project_id, &self.remote_repo_name) {
            (Some(project), Some(repo)) => Some((project.as_str(), repo.as_str())),
            _ => None,
        }
    }

    /// Cache key of the remote repository.
    pub fn repo_cache_key(&self) -> Option<RepoCacheKey> {
        self.remote_coordinates()
            .map(|(project, repo)| RepoCacheKey::new(&self.cluster, project, repo))
    }

    /// Remote repository resolved by `replica_repo`.
    pub fn remote_repo(&self) -> Option<&RepositoryDetail> {
        self.remote_repo.get()
    }

    /// Record the resolved remote repository; later calls keep the first value.
    pub fn set_remote_repo(&self, detail: RepositoryDetail) {
        let _ = self.remote_repo.set(detail);
    }

    /// Storage key the remote repository writes through.
    pub fn remote_storage_key(&self) -> Option<&str> {
        self.remote_repo().and_then(|r| r.storage_key.as_deref())
    }
}

/// Coordinates needed to rebuild a context for a retried unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayTarget {
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
}

/// Rebuilds contexts for persisted units.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Context able to replay a unit of `target`.
    async fn context_for(&self, target: &ReplayTarget) -> ReplResult<ReplicaContext>;
}
