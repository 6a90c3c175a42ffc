//! Runs one replication task against one target.
//!
//! The driver walks the task's scope unit by unit, hands each unit to the
//! replicator and keeps the run's [`ReplicaRecord`]. A unit that fails is
//! written to the failure store and the walk moves on; only setup failures,
//! fatal errors and cancellation stop the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::{ReplayTarget, ReplicaContext};
use crate::error::{ReplError, ReplResult};
use crate::failure::{FailedObject, FailureRecorder};
use crate::model::{NodeInfo, PackageSummary, PackageVersion, RepositoryType};
use crate::replicator::{Replicator, ReplicatorKind};
use crate::request::{
    MetadataDeleteRequest, MetadataSaveRequest, NodeMoveCopyRequest, NodeRenameRequest,
    PackageDeleteSummary,
};

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Units are still being replicated.
    Running,
    /// Every unit succeeded or was skipped.
    Succeeded,
    /// Setup failed, a fatal error aborted the run, or some unit failed.
    Failed,
    /// Cancelled before the walk finished.
    Cancelled,
}

/// Execution record of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaRecord {
    /// Task key.
    pub task_key: String,
    /// Target cluster name.
    pub cluster_name: String,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end.
    pub finished_at: Option<DateTime<Utc>>,
    /// Units handed to the replicator.
    pub started: u64,
    /// Units that succeeded.
    pub succeeded: u64,
    /// Units that failed.
    pub failed: u64,
    /// Units rejected by provenance or rules.
    pub skipped: u64,
    /// Run status.
    pub status: RunStatus,
    /// Why the run failed, when it failed as a whole.
    pub error_reason: Option<String>,
}

impl ReplicaRecord {
    fn start(ctx: &ReplicaContext) -> Self {
        Self {
            task_key: ctx.task.key.clone(),
            cluster_name: ctx.cluster.name.clone(),
            started_at: Utc::now(),
            finished_at: None,
            started: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            status: RunStatus::Running,
            error_reason: None,
        }
    }

    fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

/// A package and the versions of it a task replicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSelector {
    /// Package key.
    pub package_key: String,
    /// Versions to replicate; empty means all of them.
    #[serde(default)]
    pub versions: Vec<String>,
}

/// What a full-sync run covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaScope {
    /// Whole repository: its packages, or its file tree for generic repositories.
    Repository,
    /// Selected packages.
    Packages(Vec<PackageSelector>),
    /// Selected paths; directories are walked recursively.
    Paths(Vec<String>),
}

/// A single local change to propagate.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicaEvent {
    /// A node was created or overwritten.
    NodeCreated(NodeInfo),
    /// A node was deleted.
    NodeDeleted(NodeInfo),
    /// A node was moved.
    NodeMoved(NodeMoveCopyRequest),
    /// A node was copied.
    NodeCopied(NodeMoveCopyRequest),
    /// A node was renamed.
    NodeRenamed(NodeRenameRequest),
    /// Metadata was saved on a node.
    MetadataSaved(MetadataSaveRequest),
    /// Metadata keys were deleted from a node.
    MetadataDeleted(MetadataDeleteRequest),
    /// A package version was created.
    VersionCreated(PackageSummary, PackageVersion),
    /// A package or package version was deleted.
    PackageDeleted(PackageDeleteSummary),
}

enum Unit<'a> {
    File(&'a NodeInfo),
    Dir(&'a NodeInfo),
    Version(&'a PackageSummary, &'a PackageVersion),
}

impl Unit<'_> {
    fn object(&self) -> FailedObject {
        match self {
            Unit::File(node) | Unit::Dir(node) => FailedObject::Node {
                full_path: node.full_path.clone(),
            },
            Unit::Version(package, version) => FailedObject::PackageVersion {
                package_key: package.key.clone(),
                version: version.name.clone(),
            },
        }
    }
}

/// Drives replication runs through one replicator.
pub struct ReplicaTaskDriver {
    replicator: Replicator,
    recorder: FailureRecorder,
    cancel: CancellationToken,
}

impl ReplicaTaskDriver {
    /// Create a driver.
    pub fn new(replicator: Replicator, recorder: FailureRecorder) -> Self {
        Self {
            replicator,
            recorder,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops scheduling new units when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop scheduling new units; units already running finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Replicate everything in `scope`.
    pub async fn run(&self, ctx: &ReplicaContext, scope: &ReplicaScope) -> ReplicaRecord {
        let mut record = ReplicaRecord::start(ctx);
        info!(task_key = %ctx.task.key, cluster = %ctx.cluster.name, kind = ?self.replicator.kind(), "replication run started");

        let ready = match self.check_scope(scope) {
            Ok(()) => self.setup(ctx).await,
            Err(e) => Err(e),
        };
        if let Err(e) = ready {
            error!(task_key = %ctx.task.key, error = %e, "replication setup failed");
            record.error_reason = Some(e.to_string());
            record.finish(RunStatus::Failed);
            return record;
        }

        let flow = match scope {
            ReplicaScope::Repository => self.walk_repository(ctx, &mut record).await,
            ReplicaScope::Packages(selectors) => {
                self.walk_packages(ctx, selectors, &mut record).await
            }
            ReplicaScope::Paths(paths) => self.walk_paths(ctx, paths, &mut record).await,
        };
        self.conclude(ctx, record, flow)
    }

    /// Propagate one local change.
    pub async fn apply_event(&self, ctx: &ReplicaContext, event: &ReplicaEvent) -> ReplicaRecord {
        let mut record = ReplicaRecord::start(ctx);
        if let Err(e) = self.setup(ctx).await {
            record.error_reason = Some(e.to_string());
            record.finish(RunStatus::Failed);
            return record;
        }
        let r = &self.replicator;
        let flow = match event {
            ReplicaEvent::NodeCreated(node) if node.folder => {
                self.run_unit(ctx, Unit::Dir(node), &mut record).await
            }
            ReplicaEvent::NodeCreated(node) => self.run_unit(ctx, Unit::File(node), &mut record).await,
            ReplicaEvent::VersionCreated(package, version) => {
                self.run_unit(ctx, Unit::Version(package, version), &mut record).await
            }
            ReplicaEvent::NodeDeleted(node) => {
                let result = r.replica_deleted_node(ctx, node).await;
                self.account(&mut record, result)
            }
            ReplicaEvent::NodeMoved(request) => {
                let result = r.replica_node_move(ctx, request).await;
                self.account(&mut record, result)
            }
            ReplicaEvent::NodeCopied(request) => {
                let result = r.replica_node_copy(ctx, request).await;
                self.account(&mut record, result)
            }
            ReplicaEvent::NodeRenamed(request) => {
                let result = r.replica_node_rename(ctx, request).await;
                self.account(&mut record, result)
            }
            ReplicaEvent::MetadataSaved(request) => {
                let result = r.replica_metadata_save(ctx, request).await;
                self.account(&mut record, result)
            }
            ReplicaEvent::MetadataDeleted(request) => {
                let result = r.replica_metadata_delete(ctx, request).await;
                self.account(&mut record, result)
            }
            ReplicaEvent::PackageDeleted(summary) => {
                let result = r.replica_deleted_package(ctx, summary).await;
                self.account(&mut record, result)
            }
        };
        self.conclude(ctx, record, flow)
    }

    /// Replicate one file at the unit boundary.
    ///
    /// A unit failure is recorded and reported as `false`; only fatal errors
    /// and cancellation come back as `Err`.
    pub async fn replica_file(&self, ctx: &ReplicaContext, node: &NodeInfo) -> ReplResult<bool> {
        let unit = if node.folder { Unit::Dir(node) } else { Unit::File(node) };
        let mut record = ReplicaRecord::start(ctx);
        self.run_unit(ctx, unit, &mut record).await?;
        Ok(record.failed == 0)
    }

    /// Replicate one package version at the unit boundary; see [`replica_file`](Self::replica_file).
    pub async fn replica_package_version(
        &self,
        ctx: &ReplicaContext,
        package: &PackageSummary,
        version: &PackageVersion,
    ) -> ReplResult<bool> {
        let mut record = ReplicaRecord::start(ctx);
        self.run_unit(ctx, Unit::Version(package, version), &mut record)
            .await?;
        Ok(record.failed == 0)
    }

    /// External targets only take package versions, never a repository tree.
    fn check_scope(&self, scope: &ReplicaScope) -> ReplResult<()> {
        match (self.replicator.kind(), scope) {
            (ReplicatorKind::Remote, ReplicaScope::Repository | ReplicaScope::Paths(_)) => {
                Err(ReplError::Unsupported {
                    op: "repository or path sync to an external target".to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    async fn setup(&self, ctx: &ReplicaContext) -> ReplResult<()> {
        self.replicator.check_version(ctx).await?;
        self.replicator.replica_project(ctx).await?;
        self.replicator.replica_repo(ctx).await
    }

    fn conclude(
        &self,
        ctx: &ReplicaContext,
        mut record: ReplicaRecord,
        flow: ReplResult<()>,
    ) -> ReplicaRecord {
        let status = match flow {
            Err(ReplError::Cancelled) => RunStatus::Cancelled,
            Err(e) => {
                record.error_reason = Some(e.to_string());
                RunStatus::Failed
            }
            Ok(()) if record.failed > 0 => RunStatus::Failed,
            Ok(()) => RunStatus::Succeeded,
        };
        record.finish(status);
        info!(
            task_key = %ctx.task.key,
            cluster = %ctx.cluster.name,
            status = ?record.status,
            succeeded = record.succeeded,
            failed = record.failed,
            skipped = record.skipped,
            "replication run finished"
        );
        record
    }

    async fn walk_repository(
        &self,
        ctx: &ReplicaContext,
        record: &mut ReplicaRecord,
    ) -> ReplResult<()> {
        if ctx.local_repo_type == RepositoryType::Generic {
            return self.walk_dir(ctx, "/", record).await;
        }
        let page_size = ctx.config.package_page_size;
        let mut page = 1;
        loop {
            let packages = ctx
                .local
                .list_packages(&ctx.local_project_id, &ctx.local_repo_name, page, page_size)
                .await?;
            let last = packages.len() < page_size;
            for package in &packages {
                self.walk_package(ctx, package, &[], record).await?;
            }
            if last {
                return Ok(());
            }
            page += 1;
        }
    }

    async fn walk_packages(
        &self,
        ctx: &ReplicaContext,
        selectors: &[PackageSelector],
        record: &mut ReplicaRecord,
    ) -> ReplResult<()> {
        for selector in selectors {
            let package = ctx
                .local
                .find_package(&ctx.local_project_id, &ctx.local_repo_name, &selector.package_key)
                .await?;
            match package {
                Some(package) => {
                    self.walk_package(ctx, &package, &selector.versions, record).await?
                }
                None => {
                    warn!(package = %selector.package_key, "selected package not found");
                    record.failed += 1;
                }
            }
        }
        Ok(())
    }

    async fn walk_package(
        &self,
        ctx: &ReplicaContext,
        package: &PackageSummary,
        only: &[String],
        record: &mut ReplicaRecord,
    ) -> ReplResult<()> {
        self.replicator.replica_package(ctx, package).await?;
        let versions = ctx
            .local
            .list_versions(&ctx.local_project_id, &ctx.local_repo_name, &package.key)
            .await?;
        for version in versions
            .iter()
            .filter(|v| only.is_empty() || only.contains(&v.name))
        {
            self.run_unit(ctx, Unit::Version(package, version), record).await?;
        }
        Ok(())
    }

    async fn walk_paths(
        &self,
        ctx: &ReplicaContext,
        paths: &[String],
        record: &mut ReplicaRecord,
    ) -> ReplResult<()> {
        for path in paths {
            let node = ctx
                .local
                .find_node(&ctx.local_project_id, &ctx.local_repo_name, path)
                .await?;
            match node {
                Some(node) if node.folder => {
                    self.run_unit(ctx, Unit::Dir(&node), record).await?;
                    self.walk_dir(ctx, &node.full_path, record).await?;
                }
                Some(node) => self.run_unit(ctx, Unit::File(&node), record).await?,
                None => {
                    warn!(path = %path, "selected path not found");
                    record.failed += 1;
                }
            }
        }
        Ok(())
    }

    /// Depth-first walk below `root`, directories before their contents.
    async fn walk_dir(
        &self,
        ctx: &ReplicaContext,
        root: &str,
        record: &mut ReplicaRecord,
    ) -> ReplResult<()> {
        let mut pending = vec![root.to_string()];
        while let Some(dir) = pending.pop() {
            let children = ctx
                .local
                .list_children(&ctx.local_project_id, &ctx.local_repo_name, &dir)
                .await?;
            for child in children.iter().rev() {
                if child.folder {
                    self.run_unit(ctx, Unit::Dir(child), record).await?;
                    pending.push(child.full_path.clone());
                } else {
                    self.run_unit(ctx, Unit::File(child), record).await?;
                }
            }
        }
        Ok(())
    }

    async fn run_unit(
        &self,
        ctx: &ReplicaContext,
        unit: Unit<'_>,
        record: &mut ReplicaRecord,
    ) -> ReplResult<()> {
        if self.cancel.is_cancelled() {
            info!(task_key = %ctx.task.key, "replication run cancelled");
            return Err(ReplError::Cancelled);
        }
        record.started += 1;
        let result = match &unit {
            Unit::File(node) => self.replicator.replica_file(ctx, node).await,
            Unit::Dir(node) => self.replicator.replica_dir(ctx, node).await,
            Unit::Version(package, version) => {
                self.replicator
                    .replica_package_version(ctx, package, version)
                    .await
            }
        };
        let reason = match result {
            Ok(true) => {
                record.succeeded += 1;
                return Ok(());
            }
            Ok(false) => "unit reported failure".to_string(),
            Err(e) if e.is_skippable() => {
                debug!(object = ?unit.object(), reason = %e, "unit skipped");
                record.skipped += 1;
                return Ok(());
            }
            Err(e) if e.is_fatal() => {
                error!(object = ?unit.object(), error = %e, "fatal error, aborting run");
                return Err(e);
            }
            Err(e) => e.to_string(),
        };
        record.failed += 1;
        self.record_failure(ctx, unit.object(), &reason);
        Ok(())
    }

    fn account(&self, record: &mut ReplicaRecord, result: ReplResult<bool>) -> ReplResult<()> {
        record.started += 1;
        match result {
            Ok(true) => record.succeeded += 1,
            Ok(false) => record.failed += 1,
            Err(e) if e.is_skippable() => record.skipped += 1,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(task_key = %record.task_key, error = %e, "event replication failed");
                record.failed += 1;
            }
        }
        Ok(())
    }

    fn record_failure(&self, ctx: &ReplicaContext, object: FailedObject, reason: &str) {
        warn!(task_key = %ctx.task.key, object = ?object, reason, "unit failed");
        let existing = match self.recorder.find_by_object(&ctx.task.key, &object) {
            Ok(existing) => existing,
            Err(e) => {
                error!(error = %e, "failure store lookup failed");
                None
            }
        };
        let target = ReplayTarget {
            task_key: ctx.task.key.clone(),
            remote_cluster_id: ctx.cluster.id.clone(),
            local_project_id: ctx.local_project_id.clone(),
            local_repo_name: ctx.local_repo_name.clone(),
            remote_project_id: ctx.remote_project_id.clone(),
            remote_repo_name: ctx.remote_repo_name.clone(),
        };
        let existing_id = existing.as_ref().map(|r| r.id.as_str());
        if let Err(e) = self.recorder.record_failure(&target, object, reason, existing_id) {
            error!(error = %e, "could not persist failure record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::{FailureStore, MemoryFailureStore};
    use crate::model::{ArtifactChannel, MetadataModel, SOURCE_TYPE};
    use crate::replicator::{ClusterReplicator, RemoteReplicator};
    use crate::testing::{block, block_node, dir_node, file_node, fixture};
    use std::sync::Arc;

    fn driver(replicator: Replicator) -> (ReplicaTaskDriver, Arc<MemoryFailureStore>) {
        let store = Arc::new(MemoryFailureStore::new());
        (
            ReplicaTaskDriver::new(replicator, FailureRecorder::new(store.clone())),
            store,
        )
    }

    #[tokio::test]
    async fn test_generic_repository_walk() {
        let fx = fixture();
        fx.local.add_node(dir_node("/docs"));
        fx.local.add_node(file_node("/docs/a.txt", "sha-a", 10));
        fx.local.add_node(file_node("/b.txt", "sha-b", 20));
        let ctx = fx.context(ReplicatorKind::Cluster);
        let (driver, store) = driver(Replicator::Cluster(ClusterReplicator::new()));

        let record = driver.run(&ctx, &ReplicaScope::Repository).await;

        assert_eq!(record.status, RunStatus::Succeeded);
        assert_eq!(record.started, 3);
        assert_eq!(record.succeeded, 3);
        assert!(fx.remote.has_blob("sha-a"));
        assert!(fx.remote.has_blob("sha-b"));
        assert_eq!(fx.remote.node_count(), 3);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_block_failure_fails_unit() {
        let fx = fixture();
        let node = block_node("/big.bin", 3000);
        fx.local.add_node(node.clone());
        fx.local.add_blocks(
            &node,
            vec![
                block("b1", 0, 1000, "s1"),
                block("b2", 1000, 2000, "s2"),
                block("b3", 2000, 3000, "s3"),
            ],
        );
        fx.remote.fail_pushes("s2", usize::MAX);
        let ctx = fx.context(ReplicatorKind::Cluster);
        let (driver, store) = driver(Replicator::Cluster(ClusterReplicator::new()));

        assert!(!driver.replica_file(&ctx, &node).await.unwrap());
        assert_eq!(store.len(), 1);

        let record = driver
            .run(&ctx, &ReplicaScope::Paths(vec!["/big.bin".into()]))
            .await;
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.failed, 1);
        assert!(fx.remote.block_finishes().is_empty());
        assert!(fx.remote.node_creates().is_empty());

        let failures = store.list().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].object, FailedObject::Node { full_path: "/big.bin".into() });
        assert_eq!(failures[0].retry_count, 1);
        assert!(failures[0].failure_reason.contains("1 of 3 blocks"));
    }

    #[tokio::test]
    async fn test_repeat_failure_updates_existing_record() {
        let fx = fixture();
        let ctx = fx.context(ReplicatorKind::Cluster);
        let (driver, store) = driver(Replicator::Cluster(ClusterReplicator::new()));
        let scope = ReplicaScope::Paths(vec!["/a.txt".into()]);
        let mut node = file_node("/a.txt", "sha-a", 10);
        node.sha256 = None;
        fx.local.add_node(node);

        driver.run(&ctx, &scope).await;
        driver.run(&ctx, &scope).await;

        let failures = store.list().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].retry_count, 1);
    }

    #[tokio::test]
    async fn test_remote_skips_foreign_versions() {
        let fx = fixture();
        for (name, channel) in [
            ("1.0", ArtifactChannel::Local),
            ("1.1", ArtifactChannel::Proxy),
            ("1.2", ArtifactChannel::Replication),
        ] {
            let (package, mut version) =
                fx.local.add_generic_version("tool", name, &format!("/tool/{name}/tool.bin"), &format!("sha-{name}"));
            version.metadata.push(MetadataModel::system(SOURCE_TYPE, channel.as_str()));
            fx.local.add_version(&package, version);
        }
        let ctx = fx.context(ReplicatorKind::Remote);
        let (driver, store) = driver(Replicator::Remote(RemoteReplicator::new()));

        let record = driver
            .run(
                &ctx,
                &ReplicaScope::Packages(vec![PackageSelector {
                    package_key: "generic://tool".into(),
                    versions: vec![],
                }]),
            )
            .await;

        assert_eq!(record.status, RunStatus::Succeeded);
        assert_eq!(record.succeeded, 1);
        assert_eq!(record.skipped, 2);
        assert!(store.is_empty());
        let pushed: Vec<String> = fx.remote.version_creates().into_iter().map(|v| v.version_name).collect();
        assert_eq!(pushed, vec!["1.0"]);
    }

    #[tokio::test]
    async fn test_package_repository_pages() {
        let fx = fixture();
        fx.local.add_repo("proj", "npm-repo", RepositoryType::Npm);
        for i in 0..5 {
            fx.local.add_generic_version_in("npm-repo", &format!("pkg{i}"), "1.0", &format!("/pkg{i}.tgz"), &format!("sha-{i}"));
        }
        let config = crate::config::ReplicationConfig {
            package_page_size: 2,
            ..Default::default()
        };
        let ctx = fx.context_for_repo(ReplicatorKind::Cluster, "npm-repo", RepositoryType::Npm, config);
        let (driver, _) = driver(Replicator::Cluster(ClusterReplicator::new()));

        let record = driver.run(&ctx, &ReplicaScope::Repository).await;
        assert_eq!(record.status, RunStatus::Succeeded);
        assert_eq!(record.succeeded, 5);
        assert_eq!(fx.remote.version_creates().len(), 5);
    }

    #[tokio::test]
    async fn test_cancelled_run_schedules_nothing() {
        let fx = fixture();
        fx.local.add_node(file_node("/a.txt", "sha-a", 10));
        let ctx = fx.context(ReplicatorKind::Cluster);
        let (driver, _) = driver(Replicator::Cluster(ClusterReplicator::new()));
        driver.cancellation_token().cancel();

        let record = driver.run(&ctx, &ReplicaScope::Repository).await;
        assert_eq!(record.status, RunStatus::Cancelled);
        assert_eq!(record.started, 0);
        assert!(!fx.remote.has_blob("sha-a"));
    }

    #[tokio::test]
    async fn test_setup_failure_aborts() {
        let fx = fixture();
        fx.remote.existing_repo_type(RepositoryType::Maven);
        fx.local.add_node(file_node("/a.txt", "sha-a", 10));
        let ctx = fx.context(ReplicatorKind::Cluster);
        let (driver, _) = driver(Replicator::Cluster(ClusterReplicator::new()));

        let record = driver.run(&ctx, &ReplicaScope::Repository).await;
        assert_eq!(record.status, RunStatus::Failed);
        assert!(record.error_reason.unwrap().contains("MAVEN"));
        assert_eq!(record.started, 0);
    }

    #[tokio::test]
    async fn test_unit_boundary_skip_is_success() {
        let fx = fixture();
        let (package, mut version) = fx.local.add_generic_version("tool", "1.0", "/tool/1.0/tool.bin", "sha-t");
        version.metadata.push(MetadataModel::system(SOURCE_TYPE, ArtifactChannel::Proxy.as_str()));
        let ctx = fx.context(ReplicatorKind::Remote);
        let (driver, store) = driver(Replicator::Remote(RemoteReplicator::new()));

        assert!(driver.replica_package_version(&ctx, &package, &version).await.unwrap());
        assert!(store.is_empty());
        assert!(fx.remote.version_creates().is_empty());
    }

    #[tokio::test]
    async fn test_remote_rejects_repository_and_path_scopes() {
        let fx = fixture();
        fx.local.add_node(file_node("/a.txt", "sha-a", 10));
        fx.local.add_node(file_node("/b.txt", "sha-b", 20));
        let ctx = fx.context(ReplicatorKind::Remote);
        let (driver, store) = driver(Replicator::Remote(RemoteReplicator::new()));

        for scope in [ReplicaScope::Repository, ReplicaScope::Paths(vec!["/a.txt".into()])] {
            let record = driver.run(&ctx, &scope).await;
            assert_eq!(record.status, RunStatus::Failed);
            assert_eq!(record.started, 0);
            assert_eq!(record.succeeded, 0);
            assert!(record.error_reason.unwrap().contains("external target"));
        }
        assert!(store.is_empty());
        assert!(!fx.remote.has_blob("sha-a"));
        assert!(fx.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_remote_node_event_is_skipped() {
        let fx = fixture();
        let ctx = fx.context(ReplicatorKind::Remote);
        let (driver, store) = driver(Replicator::Remote(RemoteReplicator::new()));

        let record = driver
            .apply_event(&ctx, &ReplicaEvent::NodeCreated(file_node("/a.txt", "sha-a", 10)))
            .await;
        assert_eq!(record.status, RunStatus::Succeeded);
        assert_eq!(record.succeeded, 0);
        assert_eq!(record.skipped, 1);
        assert!(store.is_empty());
        assert!(fx.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_events_applied() {
        let fx = fixture();
        let ctx = fx.context(ReplicatorKind::Cluster);
        let (driver, _) = driver(Replicator::Cluster(ClusterReplicator::new()));

        let record = driver
            .apply_event(&ctx, &ReplicaEvent::NodeCreated(file_node("/a.txt", "sha-a", 10)))
            .await;
        assert_eq!(record.succeeded, 1);

        let record = driver
            .apply_event(
                &ctx,
                &ReplicaEvent::NodeRenamed(NodeRenameRequest {
                    project_id: "proj".into(),
                    repo_name: "repo".into(),
                    full_path: "/a.txt".into(),
                    new_full_path: "/b.txt".into(),
                    operator: "admin".into(),
                    source: None,
                }),
            )
            .await;
        assert_eq!(record.status, RunStatus::Succeeded);
        assert!(fx.remote.calls().contains(&"rename_node".to_string()));
    }
}
