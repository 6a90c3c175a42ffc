//! Node paths making up a package version, per repository type.

use crate::model::{PackageSummary, PackageVersion, RepositoryType};

/// Paths of the nodes holding `version`'s content.
///
/// Recorded manifest and content paths win. Otherwise the path follows the
/// layout of the package's format. Docker and OCI versions always need a
/// manifest path; their layer blobs are resolved by the protocol adapter.
pub fn package_node_paths(
    package: &PackageSummary,
    version: &PackageVersion,
    repo_type: RepositoryType,
) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for path in [&version.manifest_path, &version.content_path].into_iter().flatten() {
        if !path.is_empty() && !paths.contains(path) {
            paths.push(path.clone());
        }
    }
    if !paths.is_empty() {
        return paths;
    }

    match repo_type {
        RepositoryType::Maven => maven_paths(&package.key, &version.name),
        RepositoryType::Npm => npm_paths(&package.name, &version.name),
        RepositoryType::Helm => vec![format!("/{}-{}.tgz", package.name, version.name)],
        RepositoryType::Pypi => vec![format!("/{}/{}", package.name, version.name)],
        RepositoryType::Generic
        | RepositoryType::Docker
        | RepositoryType::Oci
        | RepositoryType::Rpm
        | RepositoryType::Conan => Vec::new(),
    }
}

fn maven_paths(package_key: &str, version: &str) -> Vec<String> {
    let coordinates = package_key.strip_prefix("gav://").unwrap_or(package_key);
    let Some((group, artifact)) = coordinates.split_once(':') else {
        return Vec::new();
    };
    let base = format!("/{}/{}/{}", group.replace('.', "/"), artifact, version);
    vec![
        format!("{}/{}-{}.pom", base, artifact, version),
        format!("{}/{}-{}.jar", base, artifact, version),
    ]
}

fn npm_paths(name: &str, version: &str) -> Vec<String> {
    let bare = name.rsplit('/').next().unwrap_or(name);
    vec![
        format!("/{}/-/{}-{}.tgz", name, bare, version),
        format!("/.npm/{}/{}-{}.json", name, bare, version),
    ]
}
