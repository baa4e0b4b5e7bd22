//! Error taxonomy for the upgrade engine.

use std::path::PathBuf;

use git_plumbing::GitError;

use crate::provider::ProviderError;
use crate::state::UpgradeState;

/// Errors produced while computing or applying an upgrade.
///
/// "No upgrade available" is not an error: it is the `NoUpgrade` terminal
/// state. Merge commits that cannot be cherry-picked are not errors either;
/// the replay engine records them as skipped.
#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    #[error("failed to resolve {reference} against {url}: {reason}")]
    Resolution {
        url: String,
        reference: String,
        reason: String,
    },

    #[error("failed to cherry-pick {sha} after {applied} applied commit(s): {source}")]
    ReplayFailure {
        sha: String,
        applied: usize,
        #[source]
        source: GitError,
    },

    #[error("{reason}: {}", path.display())]
    Persistence { path: PathBuf, reason: String },

    #[error("pull request provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("git {operation} failed: {source}")]
    Git {
        operation: String,
        #[source]
        source: GitError,
    },

    #[error("install profile error: {0}")]
    Profile(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("invalid transition {transition} from state {state}")]
    InvalidTransition { state: String, transition: String },

    #[error("upgrade aborted in state {state}{}: {source}", branch_note(.branch))]
    Aborted {
        state: UpgradeState,
        branch: Option<String>,
        #[source]
        source: Box<UpgradeError>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn branch_note(branch: &Option<String>) -> String {
    match branch {
        Some(b) => format!(" (working branch {b} left in place for inspection)"),
        None => String::new(),
    }
}

impl UpgradeError {
    /// Wrap a git failure with the operation that was being attempted.
    pub fn git(operation: impl Into<String>) -> impl FnOnce(GitError) -> UpgradeError {
        let operation = operation.into();
        move |source| UpgradeError::Git { operation, source }
    }

    /// The underlying error, looking through [`UpgradeError::Aborted`].
    pub fn root(&self) -> &UpgradeError {
        match self {
            UpgradeError::Aborted { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type for upgrade operations.
pub type Result<T> = std::result::Result<T, UpgradeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_error_names_url_and_reference() {
        let err = UpgradeError::Resolution {
            url: "https://github.com/jenkins-x/jenkins-x-versions.git".to_string(),
            reference: "v1.2.3".to_string(),
            reason: "tag not found".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("jenkins-x-versions"));
        assert!(msg.contains("v1.2.3"));
    }

    #[test]
    fn test_persistence_error_mentions_path() {
        let err = UpgradeError::Persistence {
            path: PathBuf::from("/work/jx-requirements.yml"),
            reason: "no requirements file".to_string(),
        };
        assert!(err.to_string().contains("/work/jx-requirements.yml"));
    }

    #[test]
    fn test_aborted_error_names_branch_and_unwraps_to_root() {
        let err = UpgradeError::Aborted {
            state: UpgradeState::ConfigDeltaChecked,
            branch: Some("3f1c".to_string()),
            source: Box::new(UpgradeError::Profile("unknown".to_string())),
        };
        let msg = err.to_string();
        assert!(msg.contains("3f1c"));
        assert!(msg.contains("left in place"));
        assert!(matches!(err.root(), UpgradeError::Profile(_)));
    }

    #[test]
    fn test_git_wrapper_keeps_operation() {
        let wrap = UpgradeError::git("checkout master");
        let err = wrap(GitError::GitNotFound);
        assert!(err.to_string().contains("checkout master"));
    }
}
