//! In-memory remote cluster and local data doubles for unit tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::client::{LocalDataManager, RemoteReplicaClient};
use crate::config::ReplicationConfig;
use crate::context::{
    ContextProvider, ReplayTarget, ReplicaContext, ReplicaServices, ReplicaTarget, ReplicaTaskInfo,
};
use crate::error::{ReplError, ReplResult};
use crate::model::{
    BlockNode, ClusterInfo, ClusterType, NodeInfo, PackageSummary, PackageVersion, ProjectDetail,
    RepositoryCategory, RepositoryDetail, RepositoryType,
};
use crate::replicator::ReplicatorKind;
use crate::request::{
    BlobPushRequest, BlockNodeCreateRequest, BlockNodeFinishRequest, MetadataDeleteRequest,
    MetadataSaveRequest, NodeCreateRequest, NodeDeleteRequest, NodeMoveCopyRequest,
    NodeRenameRequest, PackageDeleteRequest, PackageVersionCreateRequest,
    PackageVersionDeleteRequest, ProjectCreateRequest, PushMode, RepoCreateRequest,
};

#[derive(Default)]
struct RemoteState {
    blobs: HashSet<String>,
    hide_pushed: bool,
    visible_after: HashMap<String, usize>,
    checks: HashMap<String, usize>,
    push_failures: HashMap<String, usize>,
    chunked_rejection: Option<u16>,
    pushes: HashMap<String, Vec<PushMode>>,
    existing_repo_type: Option<RepositoryType>,
    calls: Vec<String>,
    nodes: HashSet<String>,
    node_creates: Vec<NodeCreateRequest>,
    repo_creates: Vec<RepoCreateRequest>,
    block_creates: Vec<BlockNodeCreateRequest>,
    block_finishes: Vec<BlockNodeFinishRequest>,
    version_creates: Vec<PackageVersionCreateRequest>,
    metadata_saves: Vec<MetadataSaveRequest>,
}

/// Remote cluster double. Records every write call; `check` and `version` are not recorded.
#[derive(Default)]
pub struct MockRemoteClient {
    state: Mutex<RemoteState>,
}

impl MockRemoteClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut RemoteState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn insert_blob(&self, sha256: &str) {
        self.with(|s| s.blobs.insert(sha256.to_string()));
    }

    pub fn has_blob(&self, sha256: &str) -> bool {
        self.with(|s| s.blobs.contains(sha256))
    }

    /// `check` reports the blob visible from the `polls`-th call on.
    pub fn make_visible_after(&self, sha256: &str, polls: usize) {
        self.with(|s| s.visible_after.insert(sha256.to_string(), polls));
    }

    /// Pushed blobs stay invisible to `check`.
    pub fn hide_pushed_blobs(&self) {
        self.with(|s| s.hide_pushed = true);
    }

    /// The next `times` pushes of `sha256` fail; zero clears the injection.
    pub fn fail_pushes(&self, sha256: &str, times: usize) {
        self.with(|s| s.push_failures.insert(sha256.to_string(), times));
    }

    /// Reject every chunked push with `status`.
    pub fn reject_chunked(&self, status: u16) {
        self.with(|s| s.chunked_rejection = Some(status));
    }

    /// Remote repositories come back with this type regardless of the request.
    pub fn existing_repo_type(&self, repo_type: RepositoryType) {
        self.with(|s| s.existing_repo_type = Some(repo_type));
    }

    pub fn push_count(&self, sha256: &str) -> usize {
        self.with(|s| s.pushes.get(sha256).map_or(0, Vec::len))
    }

    pub fn push_modes(&self, sha256: &str) -> Vec<PushMode> {
        self.with(|s| s.pushes.get(sha256).cloned().unwrap_or_default())
    }

    pub fn check_count(&self, sha256: &str) -> usize {
        self.with(|s| s.checks.get(sha256).copied().unwrap_or(0))
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    /// Distinct node paths currently present.
    pub fn node_count(&self) -> usize {
        self.with(|s| s.nodes.len())
    }

    pub fn node_creates(&self) -> Vec<NodeCreateRequest> {
        self.with(|s| s.node_creates.clone())
    }

    pub fn repo_creates(&self) -> Vec<RepoCreateRequest> {
        self.with(|s| s.repo_creates.clone())
    }

    pub fn block_creates(&self) -> Vec<BlockNodeCreateRequest> {
        self.with(|s| s.block_creates.clone())
    }

    pub fn block_finishes(&self) -> Vec<BlockNodeFinishRequest> {
        self.with(|s| s.block_finishes.clone())
    }

    pub fn version_creates(&self) -> Vec<PackageVersionCreateRequest> {
        self.with(|s| s.version_creates.clone())
    }

    pub fn metadata_saves(&self) -> Vec<MetadataSaveRequest> {
        self.with(|s| s.metadata_saves.clone())
    }

    fn call(&self, name: &str) {
        self.with(|s| s.calls.push(name.to_string()));
    }
}

#[async_trait]
impl RemoteReplicaClient for MockRemoteClient {
    async fn version(&self) -> ReplResult<String> {
        Ok(env!("CARGO_PKG_VERSION").to_string())
    }

    async fn check(
        &self,
        sha256: &str,
        _storage_key: Option<&str>,
        _repo_type: RepositoryType,
    ) -> ReplResult<bool> {
        Ok(self.with(|s| {
            let polls = s.checks.entry(sha256.to_string()).or_default();
            *polls += 1;
            let polls = *polls;
            s.blobs.contains(sha256) || s.visible_after.get(sha256).is_some_and(|n| polls >= *n)
        }))
    }

    async fn push_blob(&self, request: &BlobPushRequest, mode: PushMode) -> ReplResult<()> {
        self.call("push_blob");
        self.with(|s| {
            s.pushes.entry(request.sha256.clone()).or_default().push(mode);
            if let (PushMode::Chunked, Some(status)) = (mode, s.chunked_rejection) {
                return Err(ReplError::Remote {
                    status: Some(status),
                    msg: "chunked push not supported".into(),
                });
            }
            if let Some(left) = s.push_failures.get_mut(&request.sha256) {
                if *left > 0 {
                    *left -= 1;
                    return Err(ReplError::remote("injected push failure"));
                }
            }
            if !s.hide_pushed {
                s.blobs.insert(request.sha256.clone());
            }
            Ok(())
        })
    }

    async fn create_project(&self, _request: &ProjectCreateRequest) -> ReplResult<()> {
        self.call("create_project");
        Ok(())
    }

    async fn create_repo(&self, request: &RepoCreateRequest) -> ReplResult<RepositoryDetail> {
        tokio::task::yield_now().await;
        self.call("create_repo");
        let repo_type = self.with(|s| {
            s.repo_creates.push(request.clone());
            s.existing_repo_type.unwrap_or(request.repo_type)
        });
        Ok(RepositoryDetail {
            project_id: request.project_id.clone(),
            name: request.name.clone(),
            repo_type,
            category: request.category,
            public: request.public,
            description: request.description.clone(),
            configuration: request.configuration.clone(),
            storage_key: None,
            created_by: request.operator.clone(),
        })
    }

    async fn create_node(&self, request: &NodeCreateRequest) -> ReplResult<()> {
        self.call("create_node");
        self.with(|s| {
            s.nodes.insert(request.full_path.clone());
            s.node_creates.push(request.clone());
        });
        Ok(())
    }

    async fn delete_node(&self, request: &NodeDeleteRequest) -> ReplResult<()> {
        self.call("delete_node");
        self.with(|s| s.nodes.remove(&request.full_path));
        Ok(())
    }

    async fn move_node(&self, request: &NodeMoveCopyRequest) -> ReplResult<()> {
        self.call("move_node");
        self.with(|s| {
            s.nodes.remove(&request.src_full_path);
            s.nodes.insert(request.dest_full_path.clone());
        });
        Ok(())
    }

    async fn copy_node(&self, request: &NodeMoveCopyRequest) -> ReplResult<()> {
        self.call("copy_node");
        self.with(|s| s.nodes.insert(request.dest_full_path.clone()));
        Ok(())
    }

    async fn rename_node(&self, request: &NodeRenameRequest) -> ReplResult<()> {
        self.call("rename_node");
        self.with(|s| {
            s.nodes.remove(&request.full_path);
            s.nodes.insert(request.new_full_path.clone());
        });
        Ok(())
    }

    async fn create_block_node(&self, request: &BlockNodeCreateRequest) -> ReplResult<()> {
        self.call("create_block_node");
        self.with(|s| s.block_creates.push(request.clone()));
        Ok(())
    }

    async fn finish_block_node(&self, request: &BlockNodeFinishRequest) -> ReplResult<()> {
        self.call("finish_block_node");
        self.with(|s| s.block_finishes.push(request.clone()));
        Ok(())
    }

    async fn create_package_version(
        &self,
        request: &PackageVersionCreateRequest,
    ) -> ReplResult<()> {
        self.call("create_package_version");
        self.with(|s| s.version_creates.push(request.clone()));
        Ok(())
    }

    async fn delete_package(&self, _request: &PackageDeleteRequest) -> ReplResult<()> {
        self.call("delete_package");
        Ok(())
    }

    async fn delete_package_version(
        &self,
        _request: &PackageVersionDeleteRequest,
    ) -> ReplResult<()> {
        self.call("delete_package_version");
        Ok(())
    }

    async fn save_metadata(&self, request: &MetadataSaveRequest) -> ReplResult<()> {
        self.call("save_metadata");
        self.with(|s| s.metadata_saves.push(request.clone()));
        Ok(())
    }

    async fn delete_metadata(&self, _request: &MetadataDeleteRequest) -> ReplResult<()> {
        self.call("delete_metadata");
        Ok(())
    }
}

type RepoKey = (String, String);

#[derive(Default)]
struct LocalState {
    projects: HashMap<String, ProjectDetail>,
    repos: HashMap<RepoKey, RepositoryDetail>,
    nodes: HashMap<(String, String, String), NodeInfo>,
    blocks: HashMap<(String, String, String), Vec<BlockNode>>,
    packages: HashMap<RepoKey, Vec<PackageSummary>>,
    versions: HashMap<(String, String, String), Vec<PackageVersion>>,
}

/// Local cluster double holding project `proj` with generic repository `repo`.
pub struct MockLocalData {
    state: Mutex<LocalState>,
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

impl MockLocalData {
    pub fn new() -> Self {
        let local = Self {
            state: Mutex::new(LocalState::default()),
        };
        local.add_project("proj");
        local.add_repo("proj", "repo", RepositoryType::Generic);
        local
    }

    fn with<T>(&self, f: impl FnOnce(&mut LocalState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn add_project(&self, project_id: &str) {
        self.with(|s| {
            s.projects.insert(
                project_id.to_string(),
                ProjectDetail {
                    name: project_id.to_string(),
                    display_name: project_id.to_uppercase(),
                    description: None,
                    created_by: "admin".into(),
                },
            )
        });
    }

    pub fn add_repo(&self, project_id: &str, repo_name: &str, repo_type: RepositoryType) {
        self.with(|s| {
            s.repos.insert(
                (project_id.to_string(), repo_name.to_string()),
                RepositoryDetail {
                    project_id: project_id.to_string(),
                    name: repo_name.to_string(),
                    repo_type,
                    category: RepositoryCategory::Local,
                    public: false,
                    description: None,
                    configuration: serde_json::json!({}),
                    storage_key: None,
                    created_by: "admin".into(),
                },
            )
        });
    }

    pub fn add_node(&self, node: NodeInfo) {
        self.with(|s| {
            s.nodes.insert(
                (node.project_id.clone(), node.repo_name.clone(), node.full_path.clone()),
                node,
            )
        });
    }

    pub fn add_blocks(&self, node: &NodeInfo, blocks: Vec<BlockNode>) {
        self.with(|s| {
            s.blocks.insert(
                (node.project_id.clone(), node.repo_name.clone(), node.full_path.clone()),
                blocks,
            )
        });
    }

    /// Replace or append `version` of `package` in `proj/repo`.
    pub fn add_version(&self, package: &PackageSummary, version: PackageVersion) {
        self.upsert_version("repo", package, version);
    }

    fn upsert_version(&self, repo_name: &str, package: &PackageSummary, version: PackageVersion) {
        self.with(|s| {
            let packages = s
                .packages
                .entry(("proj".to_string(), repo_name.to_string()))
                .or_default();
            if !packages.iter().any(|p| p.key == package.key) {
                packages.push(package.clone());
            }
            let versions = s
                .versions
                .entry(("proj".to_string(), repo_name.to_string(), package.key.clone()))
                .or_default();
            match versions.iter_mut().find(|v| v.name == version.name) {
                Some(existing) => *existing = version,
                None => versions.push(version),
            }
        });
    }

    /// Package `generic://<name>` in `proj/repo` whose version content is one file.
    pub fn add_generic_version(
        &self,
        name: &str,
        version: &str,
        path: &str,
        sha256: &str,
    ) -> (PackageSummary, PackageVersion) {
        self.add_generic_version_in("repo", name, version, path, sha256)
    }

    pub fn add_generic_version_in(
        &self,
        repo_name: &str,
        name: &str,
        version: &str,
        path: &str,
        sha256: &str,
    ) -> (PackageSummary, PackageVersion) {
        let package = PackageSummary {
            key: format!("generic://{}", name),
            name: name.to_string(),
            package_type: RepositoryType::Generic,
            description: None,
        };
        let version = PackageVersion {
            name: version.to_string(),
            size: 10,
            manifest_path: None,
            content_path: Some(path.to_string()),
            metadata: Vec::new(),
            stage_tag: Vec::new(),
            extension: Default::default(),
            created_by: "admin".into(),
            source: None,
        };
        let mut node = file_node(path, sha256, 10);
        node.repo_name = repo_name.to_string();
        self.add_node(node);
        self.upsert_version(repo_name, &package, version.clone());
        (package, version)
    }
}

#[async_trait]
impl LocalDataManager for MockLocalData {
    async fn find_project(&self, project_id: &str) -> ReplResult<ProjectDetail> {
        self.with(|s| s.projects.get(project_id).cloned())
            .ok_or_else(|| ReplError::Store {
                msg: format!("project {} not found", project_id),
            })
    }

    async fn find_repo(&self, project_id: &str, repo_name: &str) -> ReplResult<RepositoryDetail> {
        self.with(|s| {
            s.repos
                .get(&(project_id.to_string(), repo_name.to_string()))
                .cloned()
        })
        .ok_or_else(|| ReplError::Store {
            msg: format!("repo {}/{} not found", project_id, repo_name),
        })
    }

    async fn find_node(
        &self,
        project_id: &str,
        repo_name: &str,
        full_path: &str,
    ) -> ReplResult<Option<NodeInfo>> {
        Ok(self.with(|s| {
            s.nodes
                .get(&(project_id.to_string(), repo_name.to_string(), full_path.to_string()))
                .cloned()
        }))
    }

    async fn find_node_by_id(
        &self,
        project_id: &str,
        node_id: &str,
    ) -> ReplResult<Option<NodeInfo>> {
        Ok(self.with(|s| {
            s.nodes
                .values()
                .find(|n| n.project_id == project_id && n.id == node_id)
                .cloned()
        }))
    }

    async fn list_children(
        &self,
        project_id: &str,
        repo_name: &str,
        full_path: &str,
    ) -> ReplResult<Vec<NodeInfo>> {
        let mut children: Vec<NodeInfo> = self.with(|s| {
            s.nodes
                .values()
                .filter(|n| {
                    n.project_id == project_id
                        && n.repo_name == repo_name
                        && n.full_path != "/"
                        && parent_of(&n.full_path) == full_path
                })
                .cloned()
                .collect()
        });
        children.sort_by(|a, b| a.full_path.cmp(&b.full_path));
        Ok(children)
    }

    async fn list_blocks(&self, node: &NodeInfo) -> ReplResult<Vec<BlockNode>> {
        Ok(self.with(|s| {
            s.blocks
                .get(&(node.project_id.clone(), node.repo_name.clone(), node.full_path.clone()))
                .cloned()
                .unwrap_or_default()
        }))
    }

    async fn list_packages(
        &self,
        project_id: &str,
        repo_name: &str,
        page: usize,
        page_size: usize,
    ) -> ReplResult<Vec<PackageSummary>> {
        Ok(self.with(|s| {
            s.packages
                .get(&(project_id.to_string(), repo_name.to_string()))
                .map(|packages| {
                    packages
                        .iter()
                        .skip(page.saturating_sub(1) * page_size)
                        .take(page_size)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        }))
    }

    async fn find_package(
        &self,
        project_id: &str,
        repo_name: &str,
        package_key: &str,
    ) -> ReplResult<Option<PackageSummary>> {
        Ok(self.with(|s| {
            s.packages
                .get(&(project_id.to_string(), repo_name.to_string()))
                .and_then(|packages| packages.iter().find(|p| p.key == package_key).cloned())
        }))
    }

    async fn list_versions(
        &self,
        project_id: &str,
        repo_name: &str,
        package_key: &str,
    ) -> ReplResult<Vec<PackageVersion>> {
        Ok(self.with(|s| {
            s.versions
                .get(&(project_id.to_string(), repo_name.to_string(), package_key.to_string()))
                .cloned()
                .unwrap_or_default()
        }))
    }

    async fn find_version(
        &self,
        project_id: &str,
        repo_name: &str,
        package_key: &str,
        version: &str,
    ) -> ReplResult<Option<PackageVersion>> {
        Ok(self
            .list_versions(project_id, repo_name, package_key)
            .await?
            .into_iter()
            .find(|v| v.name == version))
    }
}

/// Node in `proj/repo` with an id derived from its path.
pub fn file_node(path: &str, sha256: &str, size: u64) -> NodeInfo {
    let now = Utc::now();
    NodeInfo {
        id: format!("node{}", path.replace('/', "-")),
        project_id: "proj".into(),
        repo_name: "repo".into(),
        full_path: path.to_string(),
        folder: false,
        size,
        sha256: Some(sha256.to_string()),
        md5: None,
        crc64ecma: None,
        block_backed: false,
        metadata: Vec::new(),
        created_by: "admin".into(),
        created_date: now,
        last_modified_by: "admin".into(),
        last_modified_date: now,
        deleted: None,
        source: None,
    }
}

pub fn dir_node(path: &str) -> NodeInfo {
    NodeInfo {
        folder: true,
        sha256: None,
        size: 0,
        ..file_node(path, "", 0)
    }
}

pub fn block_node(path: &str, size: u64) -> NodeInfo {
    NodeInfo {
        block_backed: true,
        ..file_node(path, &format!("sha{}", path.replace('/', "-")), size)
    }
}

pub fn block(id: &str, start_pos: u64, end_pos: u64, sha256: &str) -> BlockNode {
    BlockNode {
        id: id.to_string(),
        node_full_path: String::new(),
        start_pos,
        end_pos,
        sha256: sha256.to_string(),
        crc64ecma: None,
        upload_id: None,
        created_by: "admin".into(),
        created_date: Utc::now(),
        expire_date: None,
        deleted: None,
    }
}

/// Local data, remote double and shared services for one test.
pub struct Fixture {
    pub local: Arc<MockLocalData>,
    pub remote: Arc<MockRemoteClient>,
    pub task: ReplicaTaskInfo,
    pub cluster: ClusterInfo,
    pub services: ReplicaServices,
}

pub fn fixture() -> Fixture {
    let local = Arc::new(MockLocalData::new());
    let services = ReplicaServices::new(local.clone(), ReplicationConfig::default());
    Fixture {
        local,
        remote: Arc::new(MockRemoteClient::new()),
        task: ReplicaTaskInfo::new("task-1", "replicate-proj"),
        cluster: ClusterInfo::new("cluster-2", "shanghai", "http://shanghai:25900", ClusterType::Standalone),
        services,
    }
}

impl Fixture {
    /// Context mirroring `proj/repo` on the remote.
    pub fn context(&self, kind: ReplicatorKind) -> ReplicaContext {
        ReplicaContext::new(
            self.task.clone(),
            self.cluster.clone(),
            self.remote.clone(),
            ReplicaTarget::mirrored("proj", "repo", RepositoryType::Generic),
            &self.services,
            kind,
        )
        .unwrap()
    }

    /// Context mirroring `proj/<repo_name>` with its own services built from `config`.
    pub fn context_for_repo(
        &self,
        kind: ReplicatorKind,
        repo_name: &str,
        repo_type: RepositoryType,
        config: ReplicationConfig,
    ) -> ReplicaContext {
        let services = ReplicaServices::new(self.local.clone(), config);
        ReplicaContext::new(
            self.task.clone(),
            self.cluster.clone(),
            self.remote.clone(),
            ReplicaTarget::mirrored("proj", repo_name, repo_type),
            &services,
            kind,
        )
        .unwrap()
    }

    pub fn provider(&self, kind: ReplicatorKind) -> FixtureProvider {
        FixtureProvider {
            task: self.task.clone(),
            cluster: self.cluster.clone(),
            remote: self.remote.clone(),
            services: self.services.clone(),
            kind,
        }
    }
}

/// Rebuilds contexts against the fixture's remote double.
pub struct FixtureProvider {
    task: ReplicaTaskInfo,
    cluster: ClusterInfo,
    remote: Arc<MockRemoteClient>,
    services: ReplicaServices,
    kind: ReplicatorKind,
}

#[async_trait]
impl ContextProvider for FixtureProvider {
    async fn context_for(&self, target: &ReplayTarget) -> ReplResult<ReplicaContext> {
        if target.remote_cluster_id != self.cluster.id {
            return Err(ReplError::ClusterNotFound {
                name: target.remote_cluster_id.clone(),
            });
        }
        let repo = self
            .services
            .local
            .find_repo(&target.local_project_id, &target.local_repo_name)
            .await?;
        ReplicaContext::new(
            self.task.clone(),
            self.cluster.clone(),
            self.remote.clone(),
            ReplicaTarget {
                local_project_id: target.local_project_id.clone(),
                local_repo_name: target.local_repo_name.clone(),
                local_repo_type: repo.repo_type,
                remote_project_id: target.remote_project_id.clone(),
                remote_repo_name: target.remote_repo_name.clone(),
                remote_repo_type: None,
            },
            &self.services,
            self.kind,
        )
    }
}
