//! Value types shared by the upgrade components.

use git_plumbing::CommitRecord;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Paths restored to their pre-upgrade content when none are configured.
pub const DEFAULT_PROTECTED_PATHS: &[&str] = &["OWNERS"];

/// Location and pinned reference of a version stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionStreamRef {
    pub url: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

impl VersionStreamRef {
    pub fn new(url: impl Into<String>, git_ref: impl Into<String>) -> Self {
        VersionStreamRef {
            url: url.into(),
            git_ref: git_ref.into(),
        }
    }

    /// Both the URL and the reference are set.
    pub fn is_complete(&self) -> bool {
        !self.url.trim().is_empty() && !self.git_ref.trim().is_empty()
    }
}

impl std::fmt::Display for VersionStreamRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.url, self.git_ref)
    }
}

/// A symbolic reference resolved to a concrete commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRevision {
    pub commit_id: String,
    /// Human-readable label: the symbol itself, or an abbreviated sha
    pub version_label: String,
}

impl ResolvedRevision {
    pub fn new(commit_id: impl Into<String>, version_label: impl Into<String>) -> Self {
        ResolvedRevision {
            commit_id: commit_id.into(),
            version_label: version_label.into(),
        }
    }

    /// Two revisions are the same state when their commits are identical,
    /// regardless of the label they were reached through.
    pub fn same_state(&self, other: &ResolvedRevision) -> bool {
        self.commit_id == other.commit_id
    }
}

/// Commits of the boot configuration between two revisions, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeDelta {
    pub from: ResolvedRevision,
    pub to: ResolvedRevision,
    pub commits: Vec<CommitRecord>,
}

impl UpgradeDelta {
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }
}

/// Paths whose pre-upgrade content survives an upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedFileSet(Vec<String>);

impl ProtectedFileSet {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for p in paths {
            let p = p.into();
            if !p.is_empty() && !out.contains(&p) {
                out.push(p);
            }
        }
        ProtectedFileSet(out)
    }

    pub fn paths(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ProtectedFileSet {
    fn default() -> Self {
        ProtectedFileSet::new(DEFAULT_PROTECTED_PATHS.iter().copied())
    }
}

/// The branch an upgrade is built on. Fresh per run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkingBranch(String);

impl WorkingBranch {
    /// A new branch name that cannot collide with an existing branch.
    pub fn unique() -> Self {
        WorkingBranch(Uuid::new_v4().to_string())
    }

    pub fn named(name: impl Into<String>) -> Self {
        WorkingBranch(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkingBranch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_ref_completeness() {
        assert!(VersionStreamRef::new("https://example.com/v.git", "master").is_complete());
        assert!(!VersionStreamRef::new("https://example.com/v.git", "").is_complete());
        assert!(!VersionStreamRef::new(" ", "master").is_complete());
    }

    #[test]
    fn test_same_state_ignores_label() {
        let a = ResolvedRevision::new("abc123", "v1.0.0");
        let b = ResolvedRevision::new("abc123", "master");
        let c = ResolvedRevision::new("def456", "v1.0.0");
        assert!(a.same_state(&b));
        assert!(!a.same_state(&c));
    }

    #[test]
    fn test_protected_set_defaults_to_owners_and_dedups() {
        assert_eq!(ProtectedFileSet::default().paths(), ["OWNERS".to_string()]);
        let set = ProtectedFileSet::new(["OWNERS", "", "OWNERS_ALIASES", "OWNERS"]);
        assert_eq!(set.paths(), ["OWNERS".to_string(), "OWNERS_ALIASES".to_string()]);
    }

    #[test]
    fn test_working_branches_are_unique() {
        assert_ne!(WorkingBranch::unique(), WorkingBranch::unique());
    }

    #[test]
    fn test_stream_ref_serializes_ref_key() {
        let json = serde_json::to_value(VersionStreamRef::new("u", "r")).unwrap();
        assert_eq!(json["ref"], "r");
    }
}
