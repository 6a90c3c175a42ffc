//! Replication strategies, one per target topology.
//!
//! [`Replicator`] is the single entry point the driver, retry service and
//! tracking service call. Every operation is safe to re-invoke: creates are
//! overwrite-safe and blobs already present remotely are not resent.

mod cluster;
mod common;
mod edge;
mod federation;
mod remote;

pub use cluster::ClusterReplicator;
pub use edge::EdgeNodeReplicator;
pub use federation::FederationReplicator;
pub use remote::RemoteReplicator;

use serde::{Deserialize, Serialize};

use crate::context::ReplicaContext;
use crate::error::ReplResult;
use crate::model::{ClusterType, NodeInfo, PackageSummary, PackageVersion};
use crate::request::{
    MetadataDeleteRequest, MetadataSaveRequest, NodeMoveCopyRequest, NodeRenameRequest,
    PackageDeleteSummary,
};

/// Which strategy serves a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicatorKind {
    /// Full replication to a peer cluster.
    Cluster,
    /// Blob push from an edge to its center.
    Edge,
    /// Attributed replication inside a federation.
    Federation,
    /// Filtered one-way push to an external registry.
    Remote,
}

impl ReplicatorKind {
    /// Strategy for a target cluster of `cluster_type`.
    ///
    /// A center target means this cluster is one of its edges; an edge target
    /// is fed by its center like any peer.
    pub fn for_cluster(cluster_type: ClusterType, federated: bool) -> Self {
        if federated {
            return ReplicatorKind::Federation;
        }
        match cluster_type {
            ClusterType::Standalone | ClusterType::Edge => ReplicatorKind::Cluster,
            ClusterType::Center => ReplicatorKind::Edge,
            ClusterType::Remote => ReplicatorKind::Remote,
        }
    }
}

/// A replication strategy.
#[derive(Clone)]
pub enum Replicator {
    /// Peer cluster.
    Cluster(ClusterReplicator),
    /// Edge to center.
    Edge(EdgeNodeReplicator),
    /// Federation member.
    Federation(FederationReplicator),
    /// External registry.
    Remote(RemoteReplicator),
}

impl Replicator {
    /// Strategy kind.
    pub fn kind(&self) -> ReplicatorKind {
        match self {
            Replicator::Cluster(_) => ReplicatorKind::Cluster,
            Replicator::Edge(_) => ReplicatorKind::Edge,
            Replicator::Federation(_) => ReplicatorKind::Federation,
            Replicator::Remote(_) => ReplicatorKind::Remote,
        }
    }

    /// Log a warning when the remote runs a different engine version.
    pub async fn check_version(&self, ctx: &ReplicaContext) -> ReplResult<()> {
        match self {
            Replicator::Remote(_) => Ok(()),
            _ => common::check_version(ctx).await,
        }
    }

    /// Create the remote project.
    pub async fn replica_project(&self, ctx: &ReplicaContext) -> ReplResult<()> {
        match self {
            Replicator::Cluster(r) => r.replica_project(ctx).await,
            Replicator::Federation(r) => r.replica_project(ctx).await,
            Replicator::Edge(_) | Replicator::Remote(_) => Ok(()),
        }
    }

    /// Resolve or create the remote repository.
    pub async fn replica_repo(&self, ctx: &ReplicaContext) -> ReplResult<()> {
        match self {
            Replicator::Cluster(r) => r.replica_repo(ctx).await,
            Replicator::Federation(r) => r.replica_repo(ctx).await,
            Replicator::Edge(_) | Replicator::Remote(_) => Ok(()),
        }
    }

    /// Packages are created implicitly with their first version.
    pub async fn replica_package(
        &self,
        _ctx: &ReplicaContext,
        _package: &PackageSummary,
    ) -> ReplResult<()> {
        Ok(())
    }

    /// Replicate one package version with its files.
    pub async fn replica_package_version(
        &self,
        ctx: &ReplicaContext,
        package: &PackageSummary,
        version: &PackageVersion,
    ) -> ReplResult<bool> {
        match self {
            Replicator::Cluster(r) => r.replica_package_version(ctx, package, version).await,
            Replicator::Edge(r) => r.replica_package_version(ctx, package, version).await,
            Replicator::Federation(r) => r.replica_package_version(ctx, package, version).await,
            Replicator::Remote(r) => r.replica_package_version(ctx, package, version).await,
        }
    }

    /// Replicate one file.
    pub async fn replica_file(&self, ctx: &ReplicaContext, node: &NodeInfo) -> ReplResult<bool> {
        match self {
            Replicator::Cluster(r) => r.replica_file(ctx, node).await,
            Replicator::Edge(r) => r.replica_file(ctx, node).await,
            Replicator::Federation(r) => r.replica_file(ctx, node).await,
            Replicator::Remote(_) => Err(RemoteReplicator::node_not_applicable(node)),
        }
    }

    /// Create a directory.
    pub async fn replica_dir(&self, ctx: &ReplicaContext, node: &NodeInfo) -> ReplResult<bool> {
        match self {
            Replicator::Cluster(r) => r.replica_dir(ctx, node).await.map(|_| true),
            Replicator::Federation(r) => r.replica_dir(ctx, node).await.map(|_| true),
            Replicator::Edge(_) => Ok(true),
            Replicator::Remote(_) => Err(RemoteReplicator::node_not_applicable(node)),
        }
    }

    /// Propagate a node deletion.
    pub async fn replica_deleted_node(
        &self,
        ctx: &ReplicaContext,
        node: &NodeInfo,
    ) -> ReplResult<bool> {
        match self {
            Replicator::Cluster(r) => r.replica_deleted_node(ctx, node).await,
            Replicator::Federation(r) => r.replica_deleted_node(ctx, node).await,
            Replicator::Edge(_) | Replicator::Remote(_) => Ok(true),
        }
    }

    /// Propagate a node move.
    pub async fn replica_node_move(
        &self,
        ctx: &ReplicaContext,
        request: &NodeMoveCopyRequest,
    ) -> ReplResult<bool> {
        match self {
            Replicator::Cluster(r) => r.replica_node_move(ctx, request).await,
            Replicator::Federation(r) => r.replica_node_move(ctx, request).await,
            Replicator::Edge(_) | Replicator::Remote(_) => Ok(true),
        }
    }

    /// Propagate a node copy.
    pub async fn replica_node_copy(
        &self,
        ctx: &ReplicaContext,
        request: &NodeMoveCopyRequest,
    ) -> ReplResult<bool> {
        match self {
            Replicator::Cluster(r) => r.replica_node_copy(ctx, request).await,
            Replicator::Federation(r) => r.replica_node_copy(ctx, request).await,
            Replicator::Edge(_) | Replicator::Remote(_) => Ok(true),
        }
    }

    /// Propagate a node rename.
    pub async fn replica_node_rename(
        &self,
        ctx: &ReplicaContext,
        request: &NodeRenameRequest,
    ) -> ReplResult<bool> {
        match self {
            Replicator::Cluster(r) => r.replica_node_rename(ctx, request).await,
            Replicator::Federation(r) => r.replica_node_rename(ctx, request).await,
            Replicator::Edge(_) | Replicator::Remote(_) => Ok(true),
        }
    }

    /// Propagate saved metadata.
    pub async fn replica_metadata_save(
        &self,
        ctx: &ReplicaContext,
        request: &MetadataSaveRequest,
    ) -> ReplResult<bool> {
        match self {
            Replicator::Cluster(r) => r.replica_metadata_save(ctx, request).await,
            Replicator::Federation(r) => r.replica_metadata_save(ctx, request).await,
            Replicator::Edge(_) | Replicator::Remote(_) => Ok(true),
        }
    }

    /// Propagate deleted metadata keys.
    pub async fn replica_metadata_delete(
        &self,
        ctx: &ReplicaContext,
        request: &MetadataDeleteRequest,
    ) -> ReplResult<bool> {
        match self {
            Replicator::Cluster(r) => r.replica_metadata_delete(ctx, request).await,
            Replicator::Federation(r) => r.replica_metadata_delete(ctx, request).await,
            Replicator::Edge(_) | Replicator::Remote(_) => Ok(true),
        }
    }

    /// Propagate a package or version deletion.
    pub async fn replica_deleted_package(
        &self,
        ctx: &ReplicaContext,
        summary: &PackageDeleteSummary,
    ) -> ReplResult<bool> {
        match self {
            Replicator::Cluster(r) => r.replica_deleted_package(ctx, summary).await,
            Replicator::Federation(r) => r.replica_deleted_package(ctx, summary).await,
            Replicator::Edge(_) | Replicator::Remote(_) => Ok(true),
        }
    }
}
