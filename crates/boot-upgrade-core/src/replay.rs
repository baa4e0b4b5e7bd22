//! Replaying boot configuration commits onto the working branch.

use std::path::Path;
use std::sync::Arc;

use git_plumbing::{CommitRecord, ConflictKind, ConflictStrategy, GitService};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, UpgradeError};
use crate::model::{UpgradeDelta, WorkingBranch};
use crate::obs;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReplayAction {
    Applied,
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayEntry {
    pub commit: CommitRecord,
    #[serde(flatten)]
    pub action: ReplayAction,
}

/// What happened to each commit of a delta, in replay order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub entries: Vec<ReplayEntry>,
}

impl ReplayReport {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn applied(&self) -> impl Iterator<Item = &CommitRecord> {
        self.entries
            .iter()
            .filter(|e| e.action == ReplayAction::Applied)
            .map(|e| &e.commit)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &CommitRecord> {
        self.entries
            .iter()
            .filter(|e| matches!(e.action, ReplayAction::Skipped { .. }))
            .map(|e| &e.commit)
    }
}

/// Cherry-picks a delta onto a working branch, oldest commit first.
pub struct ReplayEngine {
    git: Arc<dyn GitService>,
}

impl ReplayEngine {
    pub fn new(git: Arc<dyn GitService>) -> Self {
        Self { git }
    }

    /// Apply `delta` onto `branch` in `dir`.
    ///
    /// Merge commits git refuses to pick without a mainline are skipped.
    /// Any other failure stops the replay and leaves the branch as it is.
    pub async fn replay(
        &self,
        dir: &Path,
        branch: &WorkingBranch,
        delta: &UpgradeDelta,
    ) -> Result<ReplayReport> {
        let mut report = ReplayReport::default();
        if delta.is_empty() {
            return Ok(report);
        }

        let current = self
            .git
            .current_branch(dir)
            .await
            .map_err(UpgradeError::git("rev-parse current branch"))?;
        if current.as_deref() != Some(branch.as_str()) {
            self.git
                .checkout(dir, branch.as_str())
                .await
                .map_err(UpgradeError::git(format!("checkout {branch}")))?;
        }

        info!(
            from = %delta.from.commit_id,
            to = %delta.to.commit_id,
            count = delta.commits.len(),
            "cherry picking commits"
        );
        let mut applied = 0;
        for commit in &delta.commits {
            match self.git.cherry_pick(dir, &commit.sha, ConflictStrategy::Theirs).await {
                Ok(()) => {
                    applied += 1;
                    obs::emit_commit_replayed(&commit.sha, &commit.subject);
                    report.entries.push(ReplayEntry {
                        commit: commit.clone(),
                        action: ReplayAction::Applied,
                    });
                }
                Err(e) if e.conflict_kind() == Some(ConflictKind::MergeCommitNoParentSelected) => {
                    let reason = ConflictKind::MergeCommitNoParentSelected.to_string();
                    obs::emit_commit_skipped(&commit.sha, &reason);
                    report.entries.push(ReplayEntry {
                        commit: commit.clone(),
                        action: ReplayAction::Skipped { reason },
                    });
                }
                Err(source) => {
                    return Err(UpgradeError::ReplayFailure {
                        sha: commit.sha.clone(),
                        applied,
                        source,
                    });
                }
            }
        }
        Ok(report)
    }
}
