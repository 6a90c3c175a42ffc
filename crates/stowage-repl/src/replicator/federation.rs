//! Federated peer replication.
//!
//! Every object written to a peer carries `source` = this cluster's name in
//! the federation, and nothing is sent back to the cluster it came from, so
//! a change propagates across the mesh without echoing.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::common;
use crate::client::FederationDirectory;
use crate::context::ReplicaContext;
use crate::directory::federation_id_from_task_name;
use crate::error::{ReplError, ReplResult};
use crate::model::{MetadataModel, NodeInfo, PackageSummary, PackageVersion, FEDERATED};
use crate::push::BlobPusher;
use crate::request::{
    MetadataDeleteRequest, MetadataSaveRequest, NodeMoveCopyRequest, NodeRenameRequest,
    PackageDeleteSummary,
};
use crate::tracking::FederationTracker;

/// Replicates to a federation member with tracking and source attribution.
#[derive(Clone)]
pub struct FederationReplicator {
    tracker: FederationTracker,
    directory: Arc<dyn FederationDirectory>,
}

impl FederationReplicator {
    /// Create the replicator.
    pub fn new(tracker: FederationTracker, directory: Arc<dyn FederationDirectory>) -> Self {
        Self { tracker, directory }
    }

    /// Tracker writing transfer records.
    pub fn tracker(&self) -> &FederationTracker {
        &self.tracker
    }

    /// This cluster's name in the task's federation.
    pub fn current_cluster_name(&self, ctx: &ReplicaContext) -> ReplResult<String> {
        let federation_id = federation_id_from_task_name(&ctx.task.name)?;
        self.directory
            .current_cluster_name(&ctx.local_project_id, &ctx.local_repo_name, federation_id)
            .ok_or_else(|| ReplError::ClusterNotFound {
                name: format!(
                    "member of federation {} for {}/{}",
                    federation_id, ctx.local_project_id, ctx.local_repo_name
                ),
            })
    }

    fn came_from_target(ctx: &ReplicaContext, source: Option<&str>) -> bool {
        source == Some(ctx.cluster.name.as_str())
    }

    pub(crate) async fn replica_project(&self, ctx: &ReplicaContext) -> ReplResult<()> {
        let source = self.current_cluster_name(ctx)?;
        common::create_project(ctx, Some(source)).await
    }

    pub(crate) async fn replica_repo(&self, ctx: &ReplicaContext) -> ReplResult<()> {
        let source = self.current_cluster_name(ctx)?;
        common::create_repo(ctx, Some(source), Some((FEDERATED, Value::Bool(true)))).await
    }

    pub(crate) async fn replica_package_version(
        &self,
        ctx: &ReplicaContext,
        package: &PackageSummary,
        version: &PackageVersion,
    ) -> ReplResult<bool> {
        if Self::came_from_target(ctx, version.source.as_deref()) {
            debug!(package = %package.key, version = %version.name, "version came from target, skipped");
            return Ok(true);
        }
        let Some((project_id, repo_name)) = ctx.remote_coordinates() else {
            return Ok(true);
        };
        let source = self.current_cluster_name(ctx)?;
        for node in common::version_nodes(ctx, package, version).await? {
            self.replica_file(ctx, &node).await?;
        }
        let mut metadata = version.metadata.clone();
        common::upsert_metadata(&mut metadata, MetadataModel::system(FEDERATED, false));
        let request = common::version_create_request(
            package,
            version,
            project_id,
            repo_name,
            metadata,
            Some(source),
        );
        ctx.client.create_package_version(&request).await?;
        info!(cluster = %ctx.cluster.name, package = %package.key, version = %version.name, "package version federated");
        Ok(true)
    }

    /// Record node, bytes, then the `FEDERATED` marker, tracked throughout.
    pub(crate) async fn replica_file(&self, ctx: &ReplicaContext, node: &NodeInfo) -> ReplResult<bool> {
        if Self::came_from_target(ctx, node.source.as_deref()) {
            debug!(path = %node.full_path, "node came from target, skipped");
            return Ok(true);
        }
        let Some((project_id, repo_name)) = ctx.remote_coordinates() else {
            return Ok(true);
        };
        let source = self.current_cluster_name(ctx)?;
        let record = self.tracker.track(ctx, project_id, repo_name, node)?;

        if let Err(e) = Self::send_node(ctx, node, project_id, repo_name, source).await {
            self.tracker.release(&record.id, &e.to_string())?;
            return Err(e);
        }
        self.tracker.untrack(&ctx.task.key, &node.id)?;
        info!(cluster = %ctx.cluster.name, path = %node.full_path, "node federated");
        Ok(true)
    }

    async fn send_node(
        ctx: &ReplicaContext,
        node: &NodeInfo,
        project_id: &str,
        repo_name: &str,
        source: String,
    ) -> ReplResult<()> {
        let mut request =
            common::node_create_request(ctx, node, project_id, repo_name, Some(source.clone()));
        common::upsert_metadata(&mut request.metadata, MetadataModel::system(FEDERATED, false));
        ctx.client.create_node(&request).await?;

        let pusher = BlobPusher::from_config(&ctx.config);
        common::transfer_node(ctx, node, &pusher, Some(source.clone())).await?;

        ctx.client
            .save_metadata(&MetadataSaveRequest {
                project_id: project_id.to_string(),
                repo_name: repo_name.to_string(),
                full_path: node.full_path.clone(),
                metadata: vec![MetadataModel::system(FEDERATED, true)],
                replace: false,
                operator: node.last_modified_by.clone(),
                source: Some(source),
            })
            .await
    }

    pub(crate) async fn replica_dir(&self, ctx: &ReplicaContext, node: &NodeInfo) -> ReplResult<()> {
        if Self::came_from_target(ctx, node.source.as_deref()) {
            return Ok(());
        }
        let Some((project_id, repo_name)) = ctx.remote_coordinates() else {
            return Ok(());
        };
        let source = self.current_cluster_name(ctx)?;
        ctx.client
            .create_node(&common::node_create_request(
                ctx,
                node,
                project_id,
                repo_name,
                Some(source),
            ))
            .await
    }

    pub(crate) async fn replica_deleted_node(
        &self,
        ctx: &ReplicaContext,
        node: &NodeInfo,
    ) -> ReplResult<bool> {
        if Self::came_from_target(ctx, node.source.as_deref()) {
            return Ok(true);
        }
        let source = self.current_cluster_name(ctx)?;
        common::delete_node(ctx, node, Some(source)).await
    }

    pub(crate) async fn replica_node_move(
        &self,
        ctx: &ReplicaContext,
        request: &NodeMoveCopyRequest,
    ) -> ReplResult<bool> {
        if Self::came_from_target(ctx, request.source.as_deref()) {
            return Ok(true);
        }
        let source = self.current_cluster_name(ctx)?;
        if let Some(request) = common::remote_move_copy(ctx, request, Some(source)) {
            ctx.client.move_node(&request).await?;
        }
        Ok(true)
    }

    pub(crate) async fn replica_node_copy(
        &self,
        ctx: &ReplicaContext,
        request: &NodeMoveCopyRequest,
    ) -> ReplResult<bool> {
        if Self::came_from_target(ctx, request.source.as_deref()) {
            return Ok(true);
        }
        let source = self.current_cluster_name(ctx)?;
        if let Some(request) = common::remote_move_copy(ctx, request, Some(source)) {
            ctx.client.copy_node(&request).await?;
        }
        Ok(true)
    }

    pub(crate) async fn replica_node_rename(
        &self,
        ctx: &ReplicaContext,
        request: &NodeRenameRequest,
    ) -> ReplResult<bool> {
        if Self::came_from_target(ctx, request.source.as_deref()) {
            return Ok(true);
        }
        let source = self.current_cluster_name(ctx)?;
        if let Some(request) = common::remote_rename(ctx, request, Some(source)) {
            ctx.client.rename_node(&request).await?;
        }
        Ok(true)
    }

    pub(crate) async fn replica_metadata_save(
        &self,
        ctx: &ReplicaContext,
        request: &MetadataSaveRequest,
    ) -> ReplResult<bool> {
        if Self::came_from_target(ctx, request.source.as_deref()) {
            return Ok(true);
        }
        let source = self.current_cluster_name(ctx)?;
        if let Some(request) = common::remote_metadata_save(ctx, request, Some(source)) {
            ctx.client.save_metadata(&request).await?;
        }
        Ok(true)
    }

    pub(crate) async fn replica_metadata_delete(
        &self,
        ctx: &ReplicaContext,
        request: &MetadataDeleteRequest,
    ) -> ReplResult<bool> {
        if Self::came_from_target(ctx, request.source.as_deref()) {
            return Ok(true);
        }
        let source = self.current_cluster_name(ctx)?;
        if let Some(request) = common::remote_metadata_delete(ctx, request, Some(source)) {
            ctx.client.delete_metadata(&request).await?;
        }
        Ok(true)
    }

    pub(crate) async fn replica_deleted_package(
        &self,
        ctx: &ReplicaContext,
        summary: &PackageDeleteSummary,
    ) -> ReplResult<bool> {
        if Self::came_from_target(ctx, summary.source.as_deref()) {
            return Ok(true);
        }
        let source = self.current_cluster_name(ctx)?;
        common::delete_package(ctx, summary, Some(source)).await
    }
}
