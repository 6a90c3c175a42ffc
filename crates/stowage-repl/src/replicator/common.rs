//! Request builders and steps shared by the replicators.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::consistency::ConsistencyChecker;
use crate::context::ReplicaContext;
use crate::error::{ReplError, ReplResult};
use crate::mapping::package_node_paths;
use crate::model::{MetadataModel, NodeInfo, PackageSummary, PackageVersion};
use crate::push::BlobPusher;
use crate::request::{
    BlobPushRequest, MetadataDeleteRequest, MetadataSaveRequest, NodeCreateRequest,
    NodeDeleteRequest, NodeMoveCopyRequest, NodeRenameRequest, PackageDeleteRequest,
    PackageDeleteSummary, PackageVersionCreateRequest, PackageVersionDeleteRequest,
    ProjectCreateRequest, RepoCreateRequest,
};
use crate::transfer::BlockFileTransfer;

/// Compare engine versions; a mismatch is only logged.
pub(crate) async fn check_version(ctx: &ReplicaContext) -> ReplResult<()> {
    let remote = ctx.client.version().await?;
    if remote != ctx.config.version {
        warn!(
            cluster = %ctx.cluster.name,
            local = %ctx.config.version,
            remote = %remote,
            "remote cluster runs a different version"
        );
    }
    Ok(())
}

/// Create the remote project.
pub(crate) async fn create_project(ctx: &ReplicaContext, source: Option<String>) -> ReplResult<()> {
    let Some((remote_project, _)) = ctx.remote_coordinates() else {
        return Ok(());
    };
    let project = ctx.local.find_project(&ctx.local_project_id).await?;
    ctx.client
        .create_project(&ProjectCreateRequest {
            name: remote_project.to_string(),
            display_name: project.display_name,
            description: project.description,
            operator: project.created_by,
            source,
        })
        .await
}

/// Resolve the remote repository through the context's cache, creating it on a miss.
pub(crate) async fn create_repo(
    ctx: &ReplicaContext,
    source: Option<String>,
    extra_configuration: Option<(&str, Value)>,
) -> ReplResult<()> {
    let Some(key) = ctx.repo_cache_key() else {
        return Ok(());
    };
    let local_repo = ctx
        .local
        .find_repo(&ctx.local_project_id, &ctx.local_repo_name)
        .await?;
    let mut configuration = local_repo.configuration.clone();
    if let (Some((k, v)), Value::Object(map)) = (extra_configuration, &mut configuration) {
        map.insert(k.to_string(), v);
    }
    let request = RepoCreateRequest {
        project_id: key.project_id.clone(),
        name: key.repo_name.clone(),
        repo_type: ctx.remote_repo_type,
        category: local_repo.category,
        public: local_repo.public,
        description: local_repo.description.clone(),
        configuration,
        operator: local_repo.created_by.clone(),
        source,
    };
    let client = &ctx.client;
    let detail = ctx
        .repo_cache
        .get_or_create(key, ctx.remote_repo_type, || async move {
            client.create_repo(&request).await
        })
        .await?;
    ctx.set_remote_repo(detail);
    Ok(())
}

/// Node create request mirroring `node` on the remote.
pub(crate) fn node_create_request(
    ctx: &ReplicaContext,
    node: &NodeInfo,
    project_id: &str,
    repo_name: &str,
    source: Option<String>,
) -> NodeCreateRequest {
    let metadata = if ctx.task.setting.include_metadata {
        node.metadata.clone()
    } else {
        Vec::new()
    };
    NodeCreateRequest {
        project_id: project_id.to_string(),
        repo_name: repo_name.to_string(),
        full_path: node.full_path.clone(),
        folder: node.folder,
        overwrite: true,
        size: node.size,
        sha256: node.sha256.clone(),
        md5: node.md5.clone(),
        crc64ecma: node.crc64ecma.clone(),
        metadata,
        operator: node.last_modified_by.clone(),
        created_by: node.created_by.clone(),
        created_date: node.created_date,
        last_modified_by: node.last_modified_by.clone(),
        last_modified_date: node.last_modified_date,
        deleted: node.deleted,
        source,
    }
}

/// Push the bytes of a single-blob node unless the remote already has them.
///
/// Returns whether bytes were sent.
pub(crate) async fn push_node_blob(
    ctx: &ReplicaContext,
    node: &NodeInfo,
    pusher: &BlobPusher,
) -> ReplResult<bool> {
    let Some(sha256) = node.sha256.as_deref() else {
        return Err(ReplError::Unsupported {
            op: format!("blob push of {} without sha256", node.full_path),
        });
    };
    let storage_key = ctx.remote_storage_key();
    if ctx
        .client
        .check(sha256, storage_key, ctx.remote_repo_type)
        .await?
    {
        debug!(path = %node.full_path, sha256, "blob already on remote");
        return Ok(false);
    }

    let request = BlobPushRequest {
        name: node.full_path.clone(),
        sha256: sha256.to_string(),
        size: node.size,
        md5: node.md5.clone(),
        local_project_id: ctx.local_project_id.clone(),
        local_repo_name: ctx.local_repo_name.clone(),
        storage_key: storage_key.map(str::to_string),
    };
    pusher.push(ctx.client.as_ref(), &request).await?;

    if ctx.task.setting.storage_consistency_check {
        ConsistencyChecker::from_config(&ctx.config)
            .wait_until_visible(ctx.client.as_ref(), sha256, storage_key, ctx.remote_repo_type)
            .await;
    }
    Ok(true)
}

/// Move the bytes of `node`, block-backed or not.
pub(crate) async fn transfer_node(
    ctx: &ReplicaContext,
    node: &NodeInfo,
    pusher: &BlobPusher,
    source: Option<String>,
) -> ReplResult<()> {
    if node.folder {
        return Ok(());
    }
    if node.block_backed {
        BlockFileTransfer::new(ctx, pusher.clone(), source)
            .transfer_all(node)
            .await?;
    } else {
        push_node_blob(ctx, node, pusher).await?;
    }
    Ok(())
}

/// Push bytes then write the node record.
pub(crate) async fn replicate_node(
    ctx: &ReplicaContext,
    node: &NodeInfo,
    source: Option<String>,
) -> ReplResult<bool> {
    let Some((project_id, repo_name)) = ctx.remote_coordinates() else {
        return Ok(true);
    };
    let pusher = BlobPusher::from_config(&ctx.config);
    transfer_node(ctx, node, &pusher, source.clone()).await?;
    ctx.client
        .create_node(&node_create_request(ctx, node, project_id, repo_name, source))
        .await?;
    info!(cluster = %ctx.cluster.name, path = %node.full_path, "node replicated");
    Ok(true)
}

/// Local nodes holding the content of a package version.
pub(crate) async fn version_nodes(
    ctx: &ReplicaContext,
    package: &PackageSummary,
    version: &PackageVersion,
) -> ReplResult<Vec<NodeInfo>> {
    let mut nodes = Vec::new();
    for path in package_node_paths(package, version, ctx.local_repo_type) {
        let node = ctx
            .local
            .find_node(&ctx.local_project_id, &ctx.local_repo_name, &path)
            .await?
            .ok_or_else(|| {
                warn!(path = %path, package = %package.key, version = %version.name, "version node missing");
                ReplError::NodeNotFound {
                    project_id: ctx.local_project_id.clone(),
                    repo_name: ctx.local_repo_name.clone(),
                    full_path: path.clone(),
                }
            })?;
        nodes.push(node);
    }
    Ok(nodes)
}

/// Package version create request for the remote.
pub(crate) fn version_create_request(
    package: &PackageSummary,
    version: &PackageVersion,
    project_id: &str,
    repo_name: &str,
    metadata: Vec<MetadataModel>,
    source: Option<String>,
) -> PackageVersionCreateRequest {
    PackageVersionCreateRequest {
        project_id: project_id.to_string(),
        repo_name: repo_name.to_string(),
        package_name: package.name.clone(),
        package_key: package.key.clone(),
        package_type: package.package_type,
        package_description: package.description.clone(),
        version_name: version.name.clone(),
        size: version.size,
        manifest_path: version.manifest_path.clone(),
        artifact_path: version.content_path.clone(),
        stage_tag: version.stage_tag.clone(),
        metadata,
        extension: version.extension.clone(),
        overwrite: true,
        created_by: version.created_by.clone(),
        source,
    }
}

/// Replace or append a metadata entry.
pub(crate) fn upsert_metadata(metadata: &mut Vec<MetadataModel>, entry: MetadataModel) {
    match metadata.iter_mut().find(|m| m.key == entry.key) {
        Some(existing) => *existing = entry,
        None => metadata.push(entry),
    }
}

/// Delete a node on the remote.
pub(crate) async fn delete_node(
    ctx: &ReplicaContext,
    node: &NodeInfo,
    source: Option<String>,
) -> ReplResult<bool> {
    let Some((project_id, repo_name)) = ctx.remote_coordinates() else {
        return Ok(true);
    };
    ctx.client
        .delete_node(&NodeDeleteRequest {
            project_id: project_id.to_string(),
            repo_name: repo_name.to_string(),
            full_path: node.full_path.clone(),
            operator: node.last_modified_by.clone(),
            deleted_date: node.deleted,
            source,
        })
        .await?;
    Ok(true)
}

/// Retarget a move/copy at the remote repository.
pub(crate) fn remote_move_copy(
    ctx: &ReplicaContext,
    request: &NodeMoveCopyRequest,
    source: Option<String>,
) -> Option<NodeMoveCopyRequest> {
    let (project_id, repo_name) = ctx.remote_coordinates()?;
    Some(NodeMoveCopyRequest {
        src_project_id: project_id.to_string(),
        src_repo_name: repo_name.to_string(),
        dest_project_id: project_id.to_string(),
        dest_repo_name: repo_name.to_string(),
        source,
        ..request.clone()
    })
}

/// Retarget a rename at the remote repository.
pub(crate) fn remote_rename(
    ctx: &ReplicaContext,
    request: &NodeRenameRequest,
    source: Option<String>,
) -> Option<NodeRenameRequest> {
    let (project_id, repo_name) = ctx.remote_coordinates()?;
    Some(NodeRenameRequest {
        project_id: project_id.to_string(),
        repo_name: repo_name.to_string(),
        source,
        ..request.clone()
    })
}

/// Retarget a metadata save at the remote repository.
pub(crate) fn remote_metadata_save(
    ctx: &ReplicaContext,
    request: &MetadataSaveRequest,
    source: Option<String>,
) -> Option<MetadataSaveRequest> {
    let (project_id, repo_name) = ctx.remote_coordinates()?;
    Some(MetadataSaveRequest {
        project_id: project_id.to_string(),
        repo_name: repo_name.to_string(),
        source,
        ..request.clone()
    })
}

/// Retarget a metadata delete at the remote repository.
pub(crate) fn remote_metadata_delete(
    ctx: &ReplicaContext,
    request: &MetadataDeleteRequest,
    source: Option<String>,
) -> Option<MetadataDeleteRequest> {
    let (project_id, repo_name) = ctx.remote_coordinates()?;
    Some(MetadataDeleteRequest {
        project_id: project_id.to_string(),
        repo_name: repo_name.to_string(),
        source,
        ..request.clone()
    })
}

/// Propagate a package or package version deletion.
pub(crate) async fn delete_package(
    ctx: &ReplicaContext,
    summary: &PackageDeleteSummary,
    source: Option<String>,
) -> ReplResult<bool> {
    let Some((project_id, repo_name)) = ctx.remote_coordinates() else {
        return Ok(true);
    };
    match &summary.version_name {
        Some(version) => {
            ctx.client
                .delete_package_version(&PackageVersionDeleteRequest {
                    project_id: project_id.to_string(),
                    repo_name: repo_name.to_string(),
                    package_key: summary.package_key.clone(),
                    version_name: version.clone(),
                    operator: summary.operator.clone(),
                    deleted_date: summary.deleted_date,
                    source,
                })
                .await?
        }
        None => {
            ctx.client
                .delete_package(&PackageDeleteRequest {
                    project_id: project_id.to_string(),
                    repo_name: repo_name.to_string(),
                    package_key: summary.package_key.clone(),
                    operator: summary.operator.clone(),
                    deleted_date: summary.deleted_date,
                    source,
                })
                .await?
        }
    }
    Ok(true)
}
