//! One-way push of package versions to an external target.
//!
//! Only versions uploaded locally and accepted by the task's rules leave the
//! cluster. Project and repository setup succeed without doing anything; node
//! operations have no counterpart on an external registry and are skipped.

use tracing::{debug, info};

use super::common;
use crate::context::ReplicaContext;
use crate::error::{ReplError, ReplResult};
use crate::model::{
    metadata_str, ArtifactChannel, NodeInfo, PackageSummary, PackageVersion, SOURCE_TYPE,
};
use crate::push::BlobPusher;

/// Pushes filtered package versions to an external registry.
#[derive(Debug, Clone, Default)]
pub struct RemoteReplicator;

impl RemoteReplicator {
    /// Create the replicator.
    pub fn new() -> Self {
        Self
    }

    /// Whether `name` and `version` pass the task's package and version rules.
    pub fn regex_check(ctx: &ReplicaContext, name: &str, version: &str) -> bool {
        ctx.filter.matches(name, version)
    }

    /// Nodes have no counterpart on an external registry.
    pub(crate) fn node_not_applicable(node: &NodeInfo) -> ReplError {
        ReplError::NotApplicable {
            op: format!("node replication of {}", node.full_path),
        }
    }

    /// Reject versions that did not originate on this cluster.
    pub fn source_check(package: &PackageSummary, version: &PackageVersion) -> ReplResult<()> {
        match metadata_str(&version.metadata, SOURCE_TYPE) {
            Some(source_type) if source_type != ArtifactChannel::Local.as_str() => {
                Err(ReplError::SourceCheck {
                    package: package.key.clone(),
                    version: version.name.clone(),
                    source_type: source_type.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    pub(crate) async fn replica_package_version(
        &self,
        ctx: &ReplicaContext,
        package: &PackageSummary,
        version: &PackageVersion,
    ) -> ReplResult<bool> {
        Self::source_check(package, version)?;
        if !Self::regex_check(ctx, &package.name, &version.name) {
            debug!(package = %package.name, version = %version.name, "version excluded by rules");
            return Err(ReplError::Filtered {
                package: package.name.clone(),
                version: version.name.clone(),
            });
        }

        let pusher = BlobPusher::from_config(&ctx.config);
        for node in common::version_nodes(ctx, package, version).await? {
            if !node.folder && !node.block_backed {
                common::push_node_blob(ctx, &node, &pusher).await?;
            }
        }
        if let Some((project_id, repo_name)) = ctx.remote_coordinates() {
            let request = common::version_create_request(
                package,
                version,
                project_id,
                repo_name,
                version.metadata.clone(),
                None,
            );
            ctx.client.create_package_version(&request).await?;
        }
        info!(target_cluster = %ctx.cluster.name, package = %package.key, version = %version.name, "package version pushed");
        Ok(true)
    }
}
