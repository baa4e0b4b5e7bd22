//! Component version lookup through a version stream.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use git_plumbing::{parse_repository_url, GitService};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, UpgradeError};
use crate::model::VersionStreamRef;

/// Looks up which version of a git-hosted component a stream state pins.
#[async_trait]
pub trait ComponentVersionResolver: Send + Sync {
    /// Version label (e.g. `1.0.32`) of `component_url` at `stream`.
    async fn resolve_git_component_version(
        &self,
        stream: &VersionStreamRef,
        component_url: &str,
    ) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct StreamVersion {
    #[serde(default)]
    version: Option<String>,
}

/// Reads component versions from a checkout of the version stream.
///
/// Git components live at `git/<host>/<org>/<repo>.yml` with a `version`
/// field.
#[derive(Clone)]
pub struct StreamCatalogResolver {
    git: Arc<dyn GitService>,
}

impl StreamCatalogResolver {
    pub fn new(git: Arc<dyn GitService>) -> Self {
        Self { git }
    }
}

#[async_trait]
impl ComponentVersionResolver for StreamCatalogResolver {
    async fn resolve_git_component_version(
        &self,
        stream: &VersionStreamRef,
        component_url: &str,
    ) -> Result<String> {
        let resolution_error = |reason: String| UpgradeError::Resolution {
            url: stream.url.clone(),
            reference: stream.git_ref.clone(),
            reason,
        };

        let relative = component_version_path(component_url)?;
        let scratch = tempfile::Builder::new().prefix("version-stream-").tempdir()?;
        let dir = scratch.path().join("stream");
        self.git
            .clone_repo(&stream.url, &dir)
            .await
            .map_err(|e| resolution_error(format!("failed to clone: {e}")))?;
        self.git
            .checkout(&dir, &stream.git_ref)
            .await
            .map_err(|e| resolution_error(format!("failed to check out: {e}")))?;

        let version = read_version(&dir.join(&relative))
            .map_err(|reason| resolution_error(format!("{}: {reason}", relative.display())))?;
        debug!(component = component_url, version = %version, stream = %stream, "resolved component version");
        Ok(version)
    }
}

/// Path of a git component's version file inside the stream.
pub fn component_version_path(component_url: &str) -> Result<PathBuf> {
    let info = parse_repository_url(component_url).map_err(|e| UpgradeError::Resolution {
        url: component_url.to_string(),
        reference: String::new(),
        reason: e.to_string(),
    })?;
    Ok(PathBuf::from("git")
        .join(&info.host)
        .join(&info.organisation)
        .join(format!("{}.yml", info.name)))
}

fn read_version(path: &Path) -> std::result::Result<String, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| format!("no version file ({e})"))?;
    let parsed: StreamVersion =
        serde_yaml::from_str(&raw).map_err(|e| format!("invalid version file: {e}"))?;
    parsed
        .version
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| "version file has no version".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use git_plumbing::fakes::{FakeGit, FakeRemote};

    const STREAM: &str = "https://github.com/jenkins-x/jenkins-x-versions.git";
    const BOOT: &str = "https://github.com/jenkins-x/jenkins-x-boot-config.git";

    #[test]
    fn test_component_version_path() {
        let p = component_version_path(BOOT).unwrap();
        assert_eq!(
            p,
            PathBuf::from("git/github.com/jenkins-x/jenkins-x-boot-config.yml")
        );
    }

    #[tokio::test]
    async fn test_reads_version_from_stream_checkout() {
        let git = Arc::new(
            FakeGit::new().with_remote(
                STREAM,
                FakeRemote::new()
                    .with_ref("master", "s1")
                    .with_file(
                        "git/github.com/jenkins-x/jenkins-x-boot-config.yml",
                        "gitUrl: https://github.com/jenkins-x/jenkins-x-boot-config.git\nversion: 1.0.32\n",
                    ),
            ),
        );
        let resolver = StreamCatalogResolver::new(git);
        let version = resolver
            .resolve_git_component_version(&VersionStreamRef::new(STREAM, "master"), BOOT)
            .await
            .unwrap();
        assert_eq!(version, "1.0.32");
    }

    #[tokio::test]
    async fn test_missing_component_is_resolution_error() {
        let git = Arc::new(
            FakeGit::new().with_remote(STREAM, FakeRemote::new().with_ref("master", "s1")),
        );
        let resolver = StreamCatalogResolver::new(git);
        let err = resolver
            .resolve_git_component_version(&VersionStreamRef::new(STREAM, "master"), BOOT)
            .await
            .unwrap_err();
        assert!(matches!(err, UpgradeError::Resolution { .. }));
        assert!(err.to_string().contains("jenkins-x-boot-config.yml"));
    }
}
