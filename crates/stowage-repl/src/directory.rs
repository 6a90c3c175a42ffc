//! Federation membership lookup.

use dashmap::DashMap;

use crate::client::FederationDirectory;
use crate::error::{ReplError, ReplResult};

/// Federation id carried by a task name of the form `prefix/<federation id>/...`.
pub fn federation_id_from_task_name(task_name: &str) -> ReplResult<&str> {
    let segments: Vec<&str> = task_name.split('/').collect();
    match segments.as_slice() {
        [_, id, _, ..] if !id.is_empty() => Ok(*id),
        _ => Err(ReplError::InvalidTaskName {
            name: task_name.to_string(),
        }),
    }
}

/// [`FederationDirectory`] backed by a fixed membership table.
#[derive(Debug, Default)]
pub struct StaticFederationDirectory {
    members: DashMap<(String, String, String), String>,
}

impl StaticFederationDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register this cluster's name for a federated repository.
    pub fn insert(&self, project_id: &str, repo_name: &str, federation_id: &str, cluster_name: &str) {
        self.members.insert(
            (
                project_id.to_string(),
                repo_name.to_string(),
                federation_id.to_string(),
            ),
            cluster_name.to_string(),
        );
    }
}

impl FederationDirectory for StaticFederationDirectory {
    fn current_cluster_name(
        &self,
        project_id: &str,
        repo_name: &str,
        federation_id: &str,
    ) -> Option<String> {
        self.members
            .get(&(
                project_id.to_string(),
                repo_name.to_string(),
                federation_id.to_string(),
            ))
            .map(|name| name.value().clone())
    }
}
