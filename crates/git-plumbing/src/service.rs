//! The git service contract consumed by the upgrade core.

use std::path::Path;

use async_trait::async_trait;

use crate::model::{
    CommitOutcome, CommitRecord, ConflictStrategy, GitIdentity, RepositoryInfo,
};
use crate::Result;

/// Git operations needed to compute and replay an upgrade.
///
/// Inject [`crate::GitCli`] for real repositories, or
/// [`crate::fakes::FakeGit`] for tests.
#[async_trait]
pub trait GitService: Send + Sync {
    /// Clone `url` into `dir` (a working clone).
    async fn clone_repo(&self, url: &str, dir: &Path) -> Result<()>;

    /// Bare-clone `url` into `dir`.
    async fn clone_bare(&self, dir: &Path, url: &str) -> Result<()>;

    /// Create `branch` at the current HEAD without checking it out.
    async fn create_branch(&self, dir: &Path, branch: &str) -> Result<()>;

    async fn checkout(&self, dir: &Path, branch: &str) -> Result<()>;

    /// Name of the checked-out branch, `None` on a detached HEAD.
    async fn current_branch(&self, dir: &Path) -> Result<Option<String>>;

    async fn delete_local_branch(&self, dir: &Path, branch: &str) -> Result<()>;

    /// Fetch `reference` from `url` so its objects exist in `dir`.
    async fn fetch_branch(&self, dir: &Path, url: &str, reference: &str) -> Result<()>;

    /// Commit a tag (or any ref) points to.
    async fn get_commit_for_tag(&self, dir: &Path, tag: &str) -> Result<String>;

    /// Commits in `from..to`, newest first.
    async fn get_commits_between(
        &self,
        dir: &Path,
        from_sha: &str,
        to_sha: &str,
    ) -> Result<Vec<CommitRecord>>;

    /// Apply one commit onto the current branch.
    ///
    /// Failures are returned as [`crate::GitError::CherryPick`] carrying a
    /// [`crate::ConflictKind`].
    async fn cherry_pick(&self, dir: &Path, sha: &str, strategy: ConflictStrategy) -> Result<()>;

    /// Overwrite `paths` in the index and working tree with their content at `sha`.
    async fn checkout_paths_from_commit(&self, dir: &Path, sha: &str, paths: &[String])
        -> Result<()>;

    /// Whether `path` exists in the tree of `sha`.
    async fn path_exists_at(&self, dir: &Path, sha: &str, path: &str) -> Result<bool>;

    /// Remove `paths` from the index and working tree, ignoring missing ones.
    async fn remove_paths(&self, dir: &Path, paths: &[String]) -> Result<()>;

    /// Stage `paths` (including deletions) and commit them.
    async fn commit_files(&self, dir: &Path, message: &str, paths: &[String])
        -> Result<CommitOutcome>;

    async fn head_commit(&self, dir: &Path) -> Result<String>;

    /// Write the identity into the clone's local config.
    async fn set_user_identity(&self, dir: &Path, identity: &GitIdentity) -> Result<()>;

    /// Host, organisation and name of the clone's `origin` remote.
    async fn repository_info(&self, dir: &Path) -> Result<RepositoryInfo>;

    /// Push the local HEAD to `remote_branch` on `origin`.
    async fn push(&self, dir: &Path, remote_branch: &str, force: bool) -> Result<()>;
}
