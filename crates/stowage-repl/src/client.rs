//! Collaborator interfaces: the remote cluster RPC surface and the local data reader.
//!
//! Implementations live outside this crate (HTTP transport, metadata store).
//! Tests use the in-memory doubles in [`crate::testing`].

use async_trait::async_trait;

use crate::error::ReplResult;
use crate::model::{
    BlockNode, NodeInfo, PackageSummary, PackageVersion, ProjectDetail, RepositoryDetail,
    RepositoryType,
};
use crate::request::{
    BlobPushRequest, BlockNodeCreateRequest, BlockNodeFinishRequest, MetadataDeleteRequest,
    MetadataSaveRequest, NodeCreateRequest, NodeDeleteRequest, NodeMoveCopyRequest,
    NodeRenameRequest, PackageDeleteRequest, PackageVersionCreateRequest,
    PackageVersionDeleteRequest, ProjectCreateRequest, PushMode, RepoCreateRequest,
};

/// Operations a replication target must expose.
///
/// All create operations overwrite existing objects, so callers may resend them.
#[async_trait]
pub trait RemoteReplicaClient: Send + Sync {
    /// Software version of the remote.
    async fn version(&self) -> ReplResult<String>;

    /// Whether a blob with this sha256 is visible in the remote store.
    async fn check(
        &self,
        sha256: &str,
        storage_key: Option<&str>,
        repo_type: RepositoryType,
    ) -> ReplResult<bool>;

    /// Transfer the bytes of one blob.
    async fn push_blob(&self, request: &BlobPushRequest, mode: PushMode) -> ReplResult<()>;

    /// Create a project.
    async fn create_project(&self, request: &ProjectCreateRequest) -> ReplResult<()>;

    /// Create a repository and return the remote view of it.
    async fn create_repo(&self, request: &RepoCreateRequest) -> ReplResult<RepositoryDetail>;

    /// Create or overwrite a node record.
    async fn create_node(&self, request: &NodeCreateRequest) -> ReplResult<()>;

    /// Delete a node.
    async fn delete_node(&self, request: &NodeDeleteRequest) -> ReplResult<()>;

    /// Move a node.
    async fn move_node(&self, request: &NodeMoveCopyRequest) -> ReplResult<()>;

    /// Copy a node.
    async fn copy_node(&self, request: &NodeMoveCopyRequest) -> ReplResult<()>;

    /// Rename a node.
    async fn rename_node(&self, request: &NodeRenameRequest) -> ReplResult<()>;

    /// Register a transferred block with an upload session.
    async fn create_block_node(&self, request: &BlockNodeCreateRequest) -> ReplResult<()>;

    /// Seal an upload session into its node.
    async fn finish_block_node(&self, request: &BlockNodeFinishRequest) -> ReplResult<()>;

    /// Create or overwrite a package version.
    async fn create_package_version(&self, request: &PackageVersionCreateRequest)
        -> ReplResult<()>;

    /// Delete a package.
    async fn delete_package(&self, request: &PackageDeleteRequest) -> ReplResult<()>;

    /// Delete a package version.
    async fn delete_package_version(&self, request: &PackageVersionDeleteRequest)
        -> ReplResult<()>;

    /// Save node metadata.
    async fn save_metadata(&self, request: &MetadataSaveRequest) -> ReplResult<()>;

    /// Delete node metadata.
    async fn delete_metadata(&self, request: &MetadataDeleteRequest) -> ReplResult<()>;
}

/// Read access to the local cluster's records.
#[async_trait]
pub trait LocalDataManager: Send + Sync {
    /// Project by id.
    async fn find_project(&self, project_id: &str) -> ReplResult<ProjectDetail>;

    /// Repository by name.
    async fn find_repo(&self, project_id: &str, repo_name: &str) -> ReplResult<RepositoryDetail>;

    /// Node by path. Soft-deleted nodes come back with `deleted` set.
    async fn find_node(
        &self,
        project_id: &str,
        repo_name: &str,
        full_path: &str,
    ) -> ReplResult<Option<NodeInfo>>;

    /// Node by id.
    async fn find_node_by_id(&self, project_id: &str, node_id: &str)
        -> ReplResult<Option<NodeInfo>>;

    /// Direct children of a directory.
    async fn list_children(
        &self,
        project_id: &str,
        repo_name: &str,
        full_path: &str,
    ) -> ReplResult<Vec<NodeInfo>>;

    /// Blocks of a block-backed node, any order.
    async fn list_blocks(&self, node: &NodeInfo) -> ReplResult<Vec<BlockNode>>;

    /// One page of packages, 1-based.
    async fn list_packages(
        &self,
        project_id: &str,
        repo_name: &str,
        page: usize,
        page_size: usize,
    ) -> ReplResult<Vec<PackageSummary>>;

    /// Package by key.
    async fn find_package(
        &self,
        project_id: &str,
        repo_name: &str,
        package_key: &str,
    ) -> ReplResult<Option<PackageSummary>>;

    /// All versions of a package.
    async fn list_versions(
        &self,
        project_id: &str,
        repo_name: &str,
        package_key: &str,
    ) -> ReplResult<Vec<PackageVersion>>;

    /// One version of a package.
    async fn find_version(
        &self,
        project_id: &str,
        repo_name: &str,
        package_key: &str,
        version: &str,
    ) -> ReplResult<Option<PackageVersion>>;
}

/// Resolves the federation member name this cluster uses for a repository.
pub trait FederationDirectory: Send + Sync {
    /// Current cluster name inside federation `federation_id`, if this cluster is a member.
    fn current_cluster_name(
        &self,
        project_id: &str,
        repo_name: &str,
        federation_id: &str,
    ) -> Option<String>;
}
