//! Keeping locally owned files out of an upgrade.

use std::path::Path;
use std::sync::Arc;

use git_plumbing::{CommitOutcome, GitService};
use tracing::{debug, info};

use crate::error::{Result, UpgradeError};
use crate::model::ProtectedFileSet;

pub const RESTORE_COMMIT_MESSAGE: &str = "chore: exclude files from upgrade";

/// Puts protected paths back to their pre-upgrade content.
pub struct ProtectedFileGuard {
    git: Arc<dyn GitService>,
}

impl ProtectedFileGuard {
    pub fn new(git: Arc<dyn GitService>) -> Self {
        Self { git }
    }

    /// Restore `protected` to how it was at `pre_upgrade_commit` and commit
    /// the result. Returns the commit id, or `None` when nothing differed.
    pub async fn restore(
        &self,
        dir: &Path,
        pre_upgrade_commit: &str,
        protected: &ProtectedFileSet,
    ) -> Result<Option<String>> {
        if protected.is_empty() {
            return Ok(None);
        }

        let mut present = Vec::new();
        let mut introduced = Vec::new();
        for path in protected.paths() {
            if self.exists_at(dir, pre_upgrade_commit, path).await? {
                present.push(path.clone());
            } else if self.exists_at(dir, "HEAD", path).await? {
                introduced.push(path.clone());
            } else {
                debug!(path = %path, "protected path absent before and after the upgrade");
            }
        }

        if !present.is_empty() {
            self.git
                .checkout_paths_from_commit(dir, pre_upgrade_commit, &present)
                .await
                .map_err(UpgradeError::git(format!(
                    "checkout {pre_upgrade_commit} -- {}",
                    present.join(" ")
                )))?;
        }
        if !introduced.is_empty() {
            debug!(paths = ?introduced, "removing protected paths introduced by the upgrade");
            self.git
                .remove_paths(dir, &introduced)
                .await
                .map_err(UpgradeError::git(format!("rm {}", introduced.join(" "))))?;
        }

        let touched: Vec<String> = present.into_iter().chain(introduced).collect();
        if touched.is_empty() {
            return Ok(None);
        }
        let outcome = self
            .git
            .commit_files(dir, RESTORE_COMMIT_MESSAGE, &touched)
            .await
            .map_err(UpgradeError::git("commit protected files"))?;
        match outcome {
            CommitOutcome::Committed { sha } => {
                info!(commit = %sha, paths = ?touched, "restored protected files");
                Ok(Some(sha))
            }
            CommitOutcome::NothingToCommit => {
                debug!("protected files unchanged by the upgrade");
                Ok(None)
            }
        }
    }

    async fn exists_at(&self, dir: &Path, commit: &str, path: &str) -> Result<bool> {
        self.git
            .path_exists_at(dir, commit, path)
            .await
            .map_err(UpgradeError::git(format!("cat-file {commit}:{path}")))
    }
}
