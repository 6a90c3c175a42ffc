//! Standalone cluster to standalone cluster replication.

use tracing::info;

use super::common;
use crate::context::ReplicaContext;
use crate::error::ReplResult;
use crate::model::{ArtifactChannel, MetadataModel, NodeInfo, PackageSummary, PackageVersion, SOURCE_TYPE};
use crate::request::{
    MetadataDeleteRequest, MetadataSaveRequest, NodeMoveCopyRequest, NodeRenameRequest,
    PackageDeleteSummary,
};

/// Replicates everything to a peer cluster.
#[derive(Debug, Clone, Default)]
pub struct ClusterReplicator;

impl ClusterReplicator {
    /// Create the replicator.
    pub fn new() -> Self {
        Self
    }

    pub(crate) async fn replica_project(&self, ctx: &ReplicaContext) -> ReplResult<()> {
        common::create_project(ctx, None).await
    }

    pub(crate) async fn replica_repo(&self, ctx: &ReplicaContext) -> ReplResult<()> {
        common::create_repo(ctx, None, None).await
    }

    pub(crate) async fn replica_package_version(
        &self,
        ctx: &ReplicaContext,
        package: &PackageSummary,
        version: &PackageVersion,
    ) -> ReplResult<bool> {
        let Some((project_id, repo_name)) = ctx.remote_coordinates() else {
            return Ok(true);
        };
        for node in common::version_nodes(ctx, package, version).await? {
            self.replica_file(ctx, &node).await?;
        }
        let mut metadata = version.metadata.clone();
        common::upsert_metadata(
            &mut metadata,
            MetadataModel::system(SOURCE_TYPE, ArtifactChannel::Replication.as_str()),
        );
        let request =
            common::version_create_request(package, version, project_id, repo_name, metadata, None);
        ctx.client.create_package_version(&request).await?;
        info!(cluster = %ctx.cluster.name, package = %package.key, version = %version.name, "package version replicated");
        Ok(true)
    }

    pub(crate) async fn replica_file(&self, ctx: &ReplicaContext, node: &NodeInfo) -> ReplResult<bool> {
        common::replicate_node(ctx, node, None).await
    }

    pub(crate) async fn replica_dir(&self, ctx: &ReplicaContext, node: &NodeInfo) -> ReplResult<()> {
        let Some((project_id, repo_name)) = ctx.remote_coordinates() else {
            return Ok(());
        };
        ctx.client
            .create_node(&common::node_create_request(ctx, node, project_id, repo_name, None))
            .await
    }

    pub(crate) async fn replica_deleted_node(
        &self,
        ctx: &ReplicaContext,
        node: &NodeInfo,
    ) -> ReplResult<bool> {
        common::delete_node(ctx, node, None).await
    }

    pub(crate) async fn replica_node_move(
        &self,
        ctx: &ReplicaContext,
        request: &NodeMoveCopyRequest,
    ) -> ReplResult<bool> {
        if let Some(request) = common::remote_move_copy(ctx, request, None) {
            ctx.client.move_node(&request).await?;
        }
        Ok(true)
    }

    pub(crate) async fn replica_node_copy(
        &self,
        ctx: &ReplicaContext,
        request: &NodeMoveCopyRequest,
    ) -> ReplResult<bool> {
        if let Some(request) = common::remote_move_copy(ctx, request, None) {
            ctx.client.copy_node(&request).await?;
        }
        Ok(true)
    }

    pub(crate) async fn replica_node_rename(
        &self,
        ctx: &ReplicaContext,
        request: &NodeRenameRequest,
    ) -> ReplResult<bool> {
        if let Some(request) = common::remote_rename(ctx, request, None) {
            ctx.client.rename_node(&request).await?;
        }
        Ok(true)
    }

    pub(crate) async fn replica_metadata_save(
        &self,
        ctx: &ReplicaContext,
        request: &MetadataSaveRequest,
    ) -> ReplResult<bool> {
        if let Some(request) = common::remote_metadata_save(ctx, request, None) {
            ctx.client.save_metadata(&request).await?;
        }
        Ok(true)
    }

    pub(crate) async fn replica_metadata_delete(
        &self,
        ctx: &ReplicaContext,
        request: &MetadataDeleteRequest,
    ) -> ReplResult<bool> {
        if let Some(request) = common::remote_metadata_delete(ctx, request, None) {
            ctx.client.delete_metadata(&request).await?;
        }
        Ok(true)
    }

    pub(crate) async fn replica_deleted_package(
        &self,
        ctx: &ReplicaContext,
        summary: &PackageDeleteSummary,
    ) -> ReplResult<bool> {
        common::delete_package(ctx, summary, None).await
    }
}
