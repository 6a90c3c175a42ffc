//! Artifact repository records read from the local cluster and referenced remotely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata key recording how an artifact entered this cluster.
pub const SOURCE_TYPE: &str = "source_type";
/// Metadata key marking objects written by federation; `true` once the bytes landed.
pub const FEDERATED: &str = "federated";

/// Repository protocol type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepositoryType {
    /// Plain files addressed by path.
    Generic,
    /// Maven artifacts.
    Maven,
    /// npm packages.
    Npm,
    /// Python packages.
    Pypi,
    /// Helm charts.
    Helm,
    /// Docker images.
    Docker,
    /// OCI artifacts.
    Oci,
    /// RPM packages.
    Rpm,
    /// Conan recipes.
    Conan,
}

impl RepositoryType {
    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryType::Generic => "GENERIC",
            RepositoryType::Maven => "MAVEN",
            RepositoryType::Npm => "NPM",
            RepositoryType::Pypi => "PYPI",
            RepositoryType::Helm => "HELM",
            RepositoryType::Docker => "DOCKER",
            RepositoryType::Oci => "OCI",
            RepositoryType::Rpm => "RPM",
            RepositoryType::Conan => "CONAN",
        }
    }
}

impl fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an artifact arrived in the cluster; stored under [`SOURCE_TYPE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactChannel {
    /// Uploaded directly.
    Local,
    /// Cached from a proxied upstream.
    Proxy,
    /// Received through replication.
    Replication,
}

impl ArtifactChannel {
    /// Wire name of the channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactChannel::Local => "LOCAL",
            ArtifactChannel::Proxy => "PROXY",
            ArtifactChannel::Replication => "REPLICATION",
        }
    }
}

/// Repository category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepositoryCategory {
    /// Hosted repository.
    #[default]
    Local,
    /// Proxy repository.
    Remote,
    /// Aggregate of other repositories.
    Virtual,
    /// Hosted plus proxy.
    Composite,
}

/// One metadata entry on a node or package version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataModel {
    /// Metadata key.
    pub key: String,
    /// Metadata value.
    pub value: serde_json::Value,
    /// System metadata is hidden from users.
    pub system: bool,
}

impl MetadataModel {
    /// Create a user metadata entry.
    pub fn new(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            system: false,
        }
    }

    /// Create a system metadata entry.
    pub fn system(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            system: true,
        }
    }
}

/// Find a metadata value rendered as a string.
pub fn metadata_str<'a>(metadata: &'a [MetadataModel], key: &str) -> Option<&'a str> {
    metadata
        .iter()
        .find(|m| m.key == key)
        .and_then(|m| m.value.as_str())
}

/// A file or directory in a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Node id.
    pub id: String,
    /// Owning project.
    pub project_id: String,
    /// Owning repository.
    pub repo_name: String,
    /// Absolute path inside the repository.
    pub full_path: String,
    /// Directory flag.
    pub folder: bool,
    /// Size in bytes.
    pub size: u64,
    /// SHA-256 of the content.
    pub sha256: Option<String>,
    /// MD5 of the content.
    pub md5: Option<String>,
    /// CRC64-ECMA of the content.
    pub crc64ecma: Option<String>,
    /// Content is stored as ordered byte-range blocks rather than one blob.
    pub block_backed: bool,
    /// Node metadata.
    pub metadata: Vec<MetadataModel>,
    /// Creator.
    pub created_by: String,
    /// Creation time.
    pub created_date: DateTime<Utc>,
    /// Last modifier.
    pub last_modified_by: String,
    /// Last modification time.
    pub last_modified_date: DateTime<Utc>,
    /// Soft-delete timestamp; a node carrying one is a tombstone.
    pub deleted: Option<DateTime<Utc>>,
    /// Cluster this node most recently arrived from.
    pub source: Option<String>,
}

impl NodeInfo {
    /// Whether this node is a soft-deleted tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted.is_some()
    }
}

/// One byte range `[start_pos, end_pos)` of a block-backed node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockNode {
    /// Block id.
    pub id: String,
    /// Path of the owning node.
    pub node_full_path: String,
    /// First byte covered.
    pub start_pos: u64,
    /// One past the last byte covered.
    pub end_pos: u64,
    /// SHA-256 of the block content; the block's blob key.
    pub sha256: String,
    /// CRC64-ECMA of the block content.
    pub crc64ecma: Option<String>,
    /// Upload session the block belongs to.
    pub upload_id: Option<String>,
    /// Creator.
    pub created_by: String,
    /// Creation time.
    pub created_date: DateTime<Utc>,
    /// Expiry for blocks of unfinished sessions.
    pub expire_date: Option<DateTime<Utc>>,
    /// Soft-delete timestamp.
    pub deleted: Option<DateTime<Utc>>,
}

impl BlockNode {
    /// Bytes covered by this block.
    pub fn size(&self) -> u64 {
        self.end_pos.saturating_sub(self.start_pos)
    }
}

/// Logical package identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageSummary {
    /// Package key, unique within a repository.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Package type.
    pub package_type: RepositoryType,
    /// Description.
    pub description: Option<String>,
}

/// One version of a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageVersion {
    /// Version name.
    pub name: String,
    /// Total size in bytes.
    pub size: u64,
    /// Manifest path, for manifest-based formats.
    pub manifest_path: Option<String>,
    /// Main content path.
    pub content_path: Option<String>,
    /// Version metadata.
    pub metadata: Vec<MetadataModel>,
    /// Promotion labels, carried through replication unchanged.
    pub stage_tag: Vec<String>,
    /// Format-specific extension fields.
    pub extension: BTreeMap<String, String>,
    /// Creator.
    pub created_by: String,
    /// Cluster this version most recently arrived from.
    pub source: Option<String>,
}

/// Project as read from the local cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDetail {
    /// Project id.
    pub name: String,
    /// Display name.
    pub display_name: String,
    /// Description.
    pub description: Option<String>,
    /// Creator.
    pub created_by: String,
}

/// Repository as read locally or returned by a remote create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryDetail {
    /// Owning project.
    pub project_id: String,
    /// Repository name.
    pub name: String,
    /// Protocol type.
    pub repo_type: RepositoryType,
    /// Category.
    pub category: RepositoryCategory,
    /// Publicly readable.
    pub public: bool,
    /// Description.
    pub description: Option<String>,
    /// Format-specific configuration.
    pub configuration: serde_json::Value,
    /// Storage credentials key the repository writes through.
    pub storage_key: Option<String>,
    /// Creator.
    pub created_by: String,
}

/// Topology of a cluster relative to this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterType {
    /// Independent peer cluster.
    Standalone,
    /// Hub of a center/edge deployment.
    Center,
    /// Spoke of a center/edge deployment.
    Edge,
    /// External registry without project/repo concepts.
    Remote,
}

/// Descriptor of a replication target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterInfo {
    /// Cluster id.
    pub id: String,
    /// Cluster name; used as the federation `source` attribution.
    pub name: String,
    /// Base url.
    pub url: String,
    /// Topology.
    pub cluster_type: ClusterType,
}

impl ClusterInfo {
    /// Create a cluster descriptor.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        cluster_type: ClusterType,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            cluster_type,
        }
    }

    /// Identity used in cache keys.
    pub fn identity(&self) -> String {
        format!("{}@{}", self.id, self.url)
    }
}
