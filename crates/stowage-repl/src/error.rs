//! Error types for the replication subsystem.

use thiserror::Error;

/// Result type alias for replication operations.
pub type ReplResult<T> = Result<T, ReplError>;

/// HTTP status a remote returns when it does not implement chunked pushes.
pub const STATUS_METHOD_NOT_ALLOWED: u16 = 405;
/// HTTP status older remotes return for the unknown chunked push endpoint.
pub const STATUS_UNAUTHORIZED: u16 = 401;

/// Errors that can occur in the replication subsystem.
#[derive(Debug, Error)]
pub enum ReplError {
    /// Remote repository exists with a different type than requested.
    #[error("remote repo {project_id}/{repo_name} has type {actual}, expected {expected}")]
    RepoTypeConflict {
        /// Remote project id.
        project_id: String,
        /// Remote repository name.
        repo_name: String,
        /// Type the task asked for.
        expected: String,
        /// Type the remote reported.
        actual: String,
    },

    /// Package version did not originate locally and must not be re-pushed.
    #[error("source check failed for {package}@{version}: source_type={source_type}")]
    SourceCheck {
        /// Package key.
        package: String,
        /// Version name.
        version: String,
        /// The offending `source_type` metadata value.
        source_type: String,
    },

    /// Package version excluded by the task's name/version rules.
    #[error("{package}@{version} excluded by replication rules")]
    Filtered {
        /// Package name.
        package: String,
        /// Version name.
        version: String,
    },

    /// Remote cluster call failed.
    #[error("remote error (status {status:?}): {msg}")]
    Remote {
        /// HTTP-like status code when the remote produced one.
        status: Option<u16>,
        /// Error message.
        msg: String,
    },

    /// Local node lookup failed.
    #[error("node not found: {project_id}/{repo_name}{full_path}")]
    NodeNotFound {
        /// Project id.
        project_id: String,
        /// Repository name.
        repo_name: String,
        /// Full path of the node.
        full_path: String,
    },

    /// Local package or version lookup failed.
    #[error("package not found: {package_key} {version:?}")]
    PackageNotFound {
        /// Package key.
        package_key: String,
        /// Version name, when a version was requested.
        version: Option<String>,
    },

    /// Cluster (current or remote) could not be resolved.
    #[error("cluster not found: {name}")]
    ClusterNotFound {
        /// Cluster name or id.
        name: String,
    },

    /// Block list of a block-backed node is inconsistent with its size.
    #[error("invalid block layout for {full_path}: {reason}")]
    BlockLayout {
        /// Node path.
        full_path: String,
        /// What is wrong with the layout.
        reason: String,
    },

    /// One or more blocks of a block-backed node failed to transfer.
    #[error("{failed} of {total} blocks failed for {full_path}")]
    BlockTransfer {
        /// Node path.
        full_path: String,
        /// Number of failed blocks.
        failed: usize,
        /// Total number of blocks.
        total: usize,
    },

    /// Operation is not supported by the selected topology.
    #[error("unsupported operation: {op}")]
    Unsupported {
        /// Operation name.
        op: String,
    },

    /// Operation has no counterpart on the target and is skipped.
    #[error("not applicable to target: {op}")]
    NotApplicable {
        /// Operation name.
        op: String,
    },

    /// Task name does not carry the expected segments.
    #[error("invalid task name: {name}")]
    InvalidTaskName {
        /// The task name.
        name: String,
    },

    /// Persistent store failure.
    #[error("store error: {msg}")]
    Store {
        /// Error message.
        msg: String,
    },

    /// Configuration is invalid.
    #[error("invalid config: {msg}")]
    Config {
        /// Error message.
        msg: String,
    },

    /// Serialization/deserialization error.
    #[error("serialization error")]
    Serialization(#[from] bincode::Error),

    /// I/O error.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// The run was cancelled before the unit was scheduled.
    #[error("replication task cancelled")]
    Cancelled,
}

impl ReplError {
    /// Build a remote error without a status code.
    pub fn remote(msg: impl Into<String>) -> Self {
        ReplError::Remote {
            status: None,
            msg: msg.into(),
        }
    }

    /// Errors that must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReplError::RepoTypeConflict { .. } | ReplError::Cancelled)
    }

    /// Content deliberately not replicated; counted as skipped, never recorded.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            ReplError::SourceCheck { .. } | ReplError::Filtered { .. } | ReplError::NotApplicable { .. }
        )
    }

    /// Remote refused a chunked push and the unit should fall back to a whole-file push.
    pub fn is_chunked_push_rejected(&self) -> bool {
        matches!(
            self,
            ReplError::Remote {
                status: Some(STATUS_METHOD_NOT_ALLOWED | STATUS_UNAUTHORIZED),
                ..
            }
        )
    }
}
