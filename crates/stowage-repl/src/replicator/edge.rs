//! Edge to center blob push.
//!
//! The center already owns the project, repository and node records, so an
//! edge only makes sure the bytes exist there.

use tracing::debug;

use super::common;
use crate::context::ReplicaContext;
use crate::error::{ReplError, ReplResult};
use crate::model::{NodeInfo, PackageSummary, PackageVersion};
use crate::push::BlobPusher;

/// Pushes blobs from an edge cluster to its center.
#[derive(Debug, Clone, Default)]
pub struct EdgeNodeReplicator;

impl EdgeNodeReplicator {
    /// Create the replicator.
    pub fn new() -> Self {
        Self
    }

    pub(crate) async fn replica_package_version(
        &self,
        ctx: &ReplicaContext,
        package: &PackageSummary,
        version: &PackageVersion,
    ) -> ReplResult<bool> {
        for node in common::version_nodes(ctx, package, version).await? {
            self.replica_file(ctx, &node).await?;
        }
        Ok(true)
    }

    pub(crate) async fn replica_file(&self, ctx: &ReplicaContext, node: &NodeInfo) -> ReplResult<bool> {
        if node.folder {
            return Ok(true);
        }
        if node.block_backed {
            return Err(ReplError::Unsupported {
                op: format!("edge push of block-backed node {}", node.full_path),
            });
        }
        let pusher = BlobPusher::from_config(&ctx.config);
        let pushed = common::push_node_blob(ctx, node, &pusher).await?;
        debug!(cluster = %ctx.cluster.name, path = %node.full_path, pushed, "edge blob synced");
        Ok(true)
    }
}
