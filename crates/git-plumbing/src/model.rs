//! Value types exchanged with the git service.

use serde::{Deserialize, Serialize};

/// One entry of commit history between two revisions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Full commit SHA
    pub sha: String,
    /// First line of the commit message
    pub subject: String,
    /// Whether the commit has more than one parent
    pub is_merge: bool,
}

impl CommitRecord {
    pub fn new(sha: impl Into<String>, subject: impl Into<String>, is_merge: bool) -> Self {
        CommitRecord {
            sha: sha.into(),
            subject: subject.into(),
            is_merge,
        }
    }

    /// Abbreviated SHA (first 12 characters)
    pub fn short_sha(&self) -> &str {
        &self.sha[..12.min(self.sha.len())]
    }
}

/// Why a cherry-pick could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// The commit is a merge and no mainline parent was selected
    MergeCommitNoParentSelected,
    /// The change does not apply cleanly even with the requested strategy
    ContentConflict,
    /// Any other failure (missing object, dirty tree, ...)
    Other,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKind::MergeCommitNoParentSelected => {
                write!(f, "merge commit without a selected parent")
            }
            ConflictKind::ContentConflict => write!(f, "content conflict"),
            ConflictKind::Other => write!(f, "other"),
        }
    }
}

/// Conflict resolution strategy for cherry-picks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    /// Recursive strategy favouring the picked commit's side
    #[default]
    Theirs,
}

/// Author identity used for commits made in a clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

impl GitIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        GitIdentity {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Where a repository lives on its hosting provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub host: String,
    pub organisation: String,
    pub name: String,
}

impl std::fmt::Display for RepositoryInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.organisation, self.name)
    }
}

/// Result of asking git to commit a set of paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A new commit was created
    Committed { sha: String },
    /// The index held no changes for the given paths
    NothingToCommit,
}

impl CommitOutcome {
    pub fn sha(&self) -> Option<&str> {
        match self {
            CommitOutcome::Committed { sha } => Some(sha),
            CommitOutcome::NothingToCommit => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_sha_truncates() {
        let c = CommitRecord::new("0123456789abcdef0123", "subject", false);
        assert_eq!(c.short_sha(), "0123456789ab");
        let short = CommitRecord::new("abc", "subject", false);
        assert_eq!(short.short_sha(), "abc");
    }

    #[test]
    fn test_default_strategy_is_theirs() {
        assert_eq!(ConflictStrategy::default(), ConflictStrategy::Theirs);
    }

    #[test]
    fn test_commit_outcome_sha() {
        let c = CommitOutcome::Committed {
            sha: "abc".to_string(),
        };
        assert_eq!(c.sha(), Some("abc"));
        assert_eq!(CommitOutcome::NothingToCommit.sha(), None);
    }
}
