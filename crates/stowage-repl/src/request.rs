//! Requests sent to a remote cluster.
//!
//! Every create request is overwrite-safe on the remote side, so a retried unit
//! may resend requests a previous attempt already delivered.

use crate::model::{MetadataModel, RepositoryCategory, RepositoryType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How the bytes of a blob travel to the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushMode {
    /// Session-based push in fixed-size chunks.
    #[default]
    Chunked,
    /// Single request carrying the whole blob.
    Whole,
}

/// A blob push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobPushRequest {
    /// Path the blob is pushed for, used for logging and request tagging.
    pub name: String,
    /// Blob key.
    pub sha256: String,
    /// Size in bytes.
    pub size: u64,
    /// MD5 when known.
    pub md5: Option<String>,
    /// Local project the bytes are read from.
    pub local_project_id: String,
    /// Local repository the bytes are read from.
    pub local_repo_name: String,
    /// Remote storage credentials key.
    pub storage_key: Option<String>,
}

/// Create a remote project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectCreateRequest {
    /// Project id.
    pub name: String,
    /// Display name.
    pub display_name: String,
    /// Description.
    pub description: Option<String>,
    /// Operator.
    pub operator: String,
    /// Originating cluster, set by federation.
    pub source: Option<String>,
}

/// Create a remote repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoCreateRequest {
    /// Remote project.
    pub project_id: String,
    /// Remote repository name.
    pub name: String,
    /// Remote type.
    pub repo_type: RepositoryType,
    /// Category.
    pub category: RepositoryCategory,
    /// Public flag.
    pub public: bool,
    /// Description.
    pub description: Option<String>,
    /// Format configuration.
    pub configuration: serde_json::Value,
    /// Operator.
    pub operator: String,
    /// Originating cluster, set by federation.
    pub source: Option<String>,
}

/// Create or overwrite a remote node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCreateRequest {
    /// Remote project.
    pub project_id: String,
    /// Remote repository.
    pub repo_name: String,
    /// Node path.
    pub full_path: String,
    /// Directory flag.
    pub folder: bool,
    /// Overwrite an existing node.
    pub overwrite: bool,
    /// Size in bytes.
    pub size: u64,
    /// SHA-256.
    pub sha256: Option<String>,
    /// MD5.
    pub md5: Option<String>,
    /// CRC64-ECMA.
    pub crc64ecma: Option<String>,
    /// Metadata to set.
    pub metadata: Vec<MetadataModel>,
    /// Operator.
    pub operator: String,
    /// Creator.
    pub created_by: String,
    /// Creation time.
    pub created_date: DateTime<Utc>,
    /// Last modifier.
    pub last_modified_by: String,
    /// Last modification time.
    pub last_modified_date: DateTime<Utc>,
    /// Tombstone timestamp when replicating a soft-deleted node.
    pub deleted: Option<DateTime<Utc>>,
    /// Originating cluster, set by federation.
    pub source: Option<String>,
}

/// Delete a remote node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDeleteRequest {
    /// Remote project.
    pub project_id: String,
    /// Remote repository.
    pub repo_name: String,
    /// Node path.
    pub full_path: String,
    /// Operator.
    pub operator: String,
    /// Local deletion time.
    pub deleted_date: Option<DateTime<Utc>>,
    /// Originating cluster, set by federation.
    pub source: Option<String>,
}

/// Move or copy a remote node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMoveCopyRequest {
    /// Source project.
    pub src_project_id: String,
    /// Source repository.
    pub src_repo_name: String,
    /// Source path.
    pub src_full_path: String,
    /// Destination project.
    pub dest_project_id: String,
    /// Destination repository.
    pub dest_repo_name: String,
    /// Destination path.
    pub dest_full_path: String,
    /// Overwrite the destination.
    pub overwrite: bool,
    /// Operator.
    pub operator: String,
    /// Originating cluster.
    pub source: Option<String>,
}

/// Rename a remote node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRenameRequest {
    /// Remote project.
    pub project_id: String,
    /// Remote repository.
    pub repo_name: String,
    /// Current path.
    pub full_path: String,
    /// New path.
    pub new_full_path: String,
    /// Operator.
    pub operator: String,
    /// Originating cluster.
    pub source: Option<String>,
}

/// Register one received block with a remote upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockNodeCreateRequest {
    /// Remote project.
    pub project_id: String,
    /// Remote repository.
    pub repo_name: String,
    /// Owning node path.
    pub full_path: String,
    /// First byte covered.
    pub start_pos: u64,
    /// One past the last byte covered.
    pub end_pos: u64,
    /// Block size.
    pub size: u64,
    /// Block blob key.
    pub sha256: String,
    /// Block CRC64-ECMA.
    pub crc64ecma: Option<String>,
    /// Upload session id grouping the node's blocks.
    pub upload_id: String,
    /// Creator.
    pub created_by: String,
    /// Creation time.
    pub created_date: DateTime<Utc>,
    /// Expiry of the block.
    pub expire_date: Option<DateTime<Utc>>,
    /// Tombstone timestamp.
    pub deleted: Option<DateTime<Utc>>,
    /// Originating cluster.
    pub source: Option<String>,
}

/// Seal an upload session into one logical node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockNodeFinishRequest {
    /// Remote project.
    pub project_id: String,
    /// Remote repository.
    pub repo_name: String,
    /// Upload session id.
    pub upload_id: String,
    /// Node path.
    pub full_path: String,
}

/// Create or overwrite a remote package version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageVersionCreateRequest {
    /// Remote project.
    pub project_id: String,
    /// Remote repository.
    pub repo_name: String,
    /// Package name.
    pub package_name: String,
    /// Package key.
    pub package_key: String,
    /// Package type.
    pub package_type: RepositoryType,
    /// Package description.
    pub package_description: Option<String>,
    /// Version name.
    pub version_name: String,
    /// Size.
    pub size: u64,
    /// Manifest path.
    pub manifest_path: Option<String>,
    /// Artifact path.
    pub artifact_path: Option<String>,
    /// Stage tags.
    pub stage_tag: Vec<String>,
    /// Version metadata.
    pub metadata: Vec<MetadataModel>,
    /// Extension fields.
    pub extension: BTreeMap<String, String>,
    /// Overwrite an existing version.
    pub overwrite: bool,
    /// Creator.
    pub created_by: String,
    /// Originating cluster.
    pub source: Option<String>,
}

/// Delete a whole remote package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDeleteRequest {
    /// Remote project.
    pub project_id: String,
    /// Remote repository.
    pub repo_name: String,
    /// Package key.
    pub package_key: String,
    /// Operator.
    pub operator: String,
    /// Local deletion time.
    pub deleted_date: Option<DateTime<Utc>>,
    /// Originating cluster.
    pub source: Option<String>,
}

/// Delete one remote package version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageVersionDeleteRequest {
    /// Remote project.
    pub project_id: String,
    /// Remote repository.
    pub repo_name: String,
    /// Package key.
    pub package_key: String,
    /// Version name.
    pub version_name: String,
    /// Operator.
    pub operator: String,
    /// Local deletion time.
    pub deleted_date: Option<DateTime<Utc>>,
    /// Originating cluster.
    pub source: Option<String>,
}

/// A locally deleted package or package version to propagate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDeleteSummary {
    /// Package key.
    pub package_key: String,
    /// Package name.
    pub package_name: String,
    /// Deleted version; `None` deletes the whole package.
    pub version_name: Option<String>,
    /// Operator.
    pub operator: String,
    /// Local deletion time.
    pub deleted_date: Option<DateTime<Utc>>,
    /// Cluster the deletion arrived from, if it was itself replicated.
    pub source: Option<String>,
}

/// Save metadata on a remote node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataSaveRequest {
    /// Remote project.
    pub project_id: String,
    /// Remote repository.
    pub repo_name: String,
    /// Node path.
    pub full_path: String,
    /// Entries to save.
    pub metadata: Vec<MetadataModel>,
    /// Replace all existing entries instead of merging.
    pub replace: bool,
    /// Operator.
    pub operator: String,
    /// Originating cluster.
    pub source: Option<String>,
}

/// Delete metadata keys on a remote node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataDeleteRequest {
    /// Remote project.
    pub project_id: String,
    /// Remote repository.
    pub repo_name: String,
    /// Node path.
    pub full_path: String,
    /// Keys to delete.
    pub keys: Vec<String>,
    /// Operator.
    pub operator: String,
    /// Originating cluster.
    pub source: Option<String>,
}
