//! git-plumbing: the git layer under boot-upgrade
//!
//! Defines the [`GitService`] contract the upgrade core consumes, a
//! [`GitCli`] implementation that shells out to `git`, repository URL
//! helpers, and an in-memory [`fakes::FakeGit`] for tests.
//!
//! Cherry-pick failures are classified into a typed [`ConflictKind`] here so
//! callers never have to match on git's human-readable messages.

pub mod cli;
pub mod error;
pub mod fakes;
pub mod model;
pub mod service;
pub mod url;

pub use cli::GitCli;
pub use error::GitError;
pub use model::{
    CommitOutcome, CommitRecord, ConflictKind, ConflictStrategy, GitIdentity, RepositoryInfo,
};
pub use service::GitService;
pub use url::parse_repository_url;

/// Result type for git-plumbing operations
pub type Result<T> = std::result::Result<T, GitError>;
