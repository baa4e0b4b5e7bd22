//! Error types for git-plumbing

use thiserror::Error;

use crate::model::ConflictKind;

/// Errors that can occur while driving git
#[derive(Error, Debug)]
pub enum GitError {
    /// Git binary not found
    #[error("git is not installed or not in PATH")]
    GitNotFound,

    /// A git command exited non-zero
    #[error("git {args} failed: {stderr}")]
    CommandFailed { args: String, stderr: String },

    /// A cherry-pick could not be applied
    #[error("cherry-picking {sha} failed ({kind}): {stderr}")]
    CherryPick {
        sha: String,
        kind: ConflictKind,
        stderr: String,
    },

    /// A tag or ref does not resolve to a commit
    #[error("reference {reference} not found in {dir}")]
    RefNotFound { reference: String, dir: String },

    /// Unparseable git output or repository URL
    #[error("unexpected git output: {0}")]
    Parse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GitError {
    /// The conflict classification, when this is a cherry-pick failure.
    pub fn conflict_kind(&self) -> Option<ConflictKind> {
        match self {
            GitError::CherryPick { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
