//! Computing the boot configuration commits between two stream states.

use std::path::Path;
use std::sync::Arc;

use git_plumbing::GitService;
use tracing::info;

use crate::error::{Result, UpgradeError};
use crate::model::{ResolvedRevision, UpgradeDelta, VersionStreamRef};
use crate::versions::ComponentVersionResolver;

/// Prefix that turns a version label into a release tag.
pub const VERSION_TAG_PREFIX: &str = "v";

/// Release tag for a version label; labels already prefixed are kept as is.
pub fn version_tag(label: &str) -> String {
    if label.starts_with(VERSION_TAG_PREFIX) {
        label.to_string()
    } else {
        format!("{VERSION_TAG_PREFIX}{label}")
    }
}

pub struct ConfigDeltaComputer {
    git: Arc<dyn GitService>,
    versions: Arc<dyn ComponentVersionResolver>,
}

impl ConfigDeltaComputer {
    pub fn new(git: Arc<dyn GitService>, versions: Arc<dyn ComponentVersionResolver>) -> Self {
        Self { git, versions }
    }

    /// Commits of `config_url` separating the configuration pinned by
    /// `from_stream_ref` from the one pinned by `to_stream_ref`, oldest first.
    pub async fn compute_delta(
        &self,
        stream_url: &str,
        config_url: &str,
        from_stream_ref: &str,
        to_stream_ref: &str,
    ) -> Result<UpgradeDelta> {
        // removed on every exit path when dropped
        let scratch = tempfile::Builder::new().prefix("boot-config-").tempdir()?;
        let bare = scratch.path().join("config.git");
        self.git
            .clone_bare(&bare, config_url)
            .await
            .map_err(UpgradeError::git(format!("clone --bare {config_url}")))?;

        let from = self
            .config_revision(&bare, stream_url, from_stream_ref, config_url)
            .await?;
        let to = self
            .config_revision(&bare, stream_url, to_stream_ref, config_url)
            .await?;

        if from.same_state(&to) {
            info!(version = %to.version_label, "No boot config upgrade available");
            return Ok(UpgradeDelta {
                from,
                to,
                commits: Vec::new(),
            });
        }

        info!(
            from = %version_tag(&from.version_label),
            to = %version_tag(&to.version_label),
            "boot config upgrade available"
        );
        let mut commits = self
            .git
            .get_commits_between(&bare, &from.commit_id, &to.commit_id)
            .await
            .map_err(UpgradeError::git(format!(
                "log {}..{}",
                from.commit_id, to.commit_id
            )))?;
        commits.reverse();
        Ok(UpgradeDelta { from, to, commits })
    }

    async fn config_revision(
        &self,
        bare: &Path,
        stream_url: &str,
        stream_ref: &str,
        config_url: &str,
    ) -> Result<ResolvedRevision> {
        let stream = VersionStreamRef::new(stream_url, stream_ref);
        let label = self
            .versions
            .resolve_git_component_version(&stream, config_url)
            .await?;
        let tag = version_tag(&label);
        let commit_id = self
            .git
            .get_commit_for_tag(bare, &tag)
            .await
            .map_err(|e| UpgradeError::Resolution {
                url: config_url.to_string(),
                reference: tag.clone(),
                reason: e.to_string(),
            })?;
        Ok(ResolvedRevision::new(commit_id, label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;
    use git_plumbing::fakes::{FakeGit, FakeRemote};
    use git_plumbing::CommitRecord;

    const STREAM: &str = "https://github.com/jenkins-x/jenkins-x-versions.git";
    const BOOT: &str = "https://github.com/jenkins-x/jenkins-x-boot-config.git";

    struct MapVersions(HashMap<String, String>);

    #[async_trait]
    impl ComponentVersionResolver for MapVersions {
        async fn resolve_git_component_version(
            &self,
            stream: &VersionStreamRef,
            _component_url: &str,
        ) -> Result<String> {
            self.0
                .get(&stream.git_ref)
                .cloned()
                .ok_or_else(|| UpgradeError::Resolution {
                    url: stream.url.clone(),
                    reference: stream.git_ref.clone(),
                    reason: "unknown".to_string(),
                })
        }
    }

    fn versions(pairs: &[(&str, &str)]) -> Arc<MapVersions> {
        Arc::new(MapVersions(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ))
    }

    fn boot_remote() -> FakeRemote {
        FakeRemote::new()
            .with_history(vec![
                CommitRecord::new("b0", "release 1.0.0", false),
                CommitRecord::new("b1", "fix: values", false),
                CommitRecord::new("b2", "feat: new app", false),
            ])
            .with_ref("v1.0.0", "b0")
            .with_ref("v1.0.2", "b2")
    }

    #[test]
    fn test_version_tag_prefix_not_doubled() {
        assert_eq!(version_tag("1.0.2"), "v1.0.2");
        assert_eq!(version_tag("v1.0.2"), "v1.0.2");
    }

    #[tokio::test]
    async fn test_delta_is_oldest_first() {
        let git = Arc::new(FakeGit::new().with_remote(BOOT, boot_remote()));
        let computer = ConfigDeltaComputer::new(
            git,
            versions(&[("s0", "1.0.0"), ("s1", "v1.0.2")]),
        );
        let delta = computer.compute_delta(STREAM, BOOT, "s0", "s1").await.unwrap();

        assert_eq!(delta.from.commit_id, "b0");
        assert_eq!(delta.to.commit_id, "b2");
        let shas: Vec<&str> = delta.commits.iter().map(|c| c.sha.as_str()).collect();
        assert_eq!(shas, vec!["b1", "b2"]);
    }

    #[tokio::test]
    async fn test_same_config_version_is_empty_delta() {
        let git = Arc::new(FakeGit::new().with_remote(BOOT, boot_remote()));
        let computer =
            ConfigDeltaComputer::new(git, versions(&[("s0", "1.0.0"), ("s1", "1.0.0")]));
        let delta = computer.compute_delta(STREAM, BOOT, "s0", "s1").await.unwrap();
        assert!(delta.is_empty());
        assert!(delta.from.same_state(&delta.to));
    }

    #[tokio::test]
    async fn test_missing_tag_is_resolution_error() {
        let git = Arc::new(FakeGit::new().with_remote(BOOT, boot_remote()));
        let computer =
            ConfigDeltaComputer::new(git, versions(&[("s0", "1.0.0"), ("s1", "9.9.9")]));
        let err = computer
            .compute_delta(STREAM, BOOT, "s0", "s1")
            .await
            .unwrap_err();
        match err {
            UpgradeError::Resolution { reference, .. } => assert_eq!(reference, "v9.9.9"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_scratch_clone_is_removed() {
        let git = Arc::new(FakeGit::new().with_remote(BOOT, boot_remote()));
        let computer = ConfigDeltaComputer::new(
            git.clone(),
            versions(&[("s0", "1.0.0"), ("s1", "1.0.2")]),
        );
        computer.compute_delta(STREAM, BOOT, "s0", "s1").await.unwrap();

        let bare_dir = git.calls().into_iter().find_map(|c| match c {
            git_plumbing::fakes::GitCall::CloneBare { dir, .. } => Some(dir),
            _ => None,
        });
        assert!(!bare_dir.unwrap().exists());
    }
}
