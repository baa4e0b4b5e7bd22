//! In-memory fake for the git service (testing only)
//!
//! [`FakeGit`] models remotes as a linear history plus a ref table, tracks
//! the branches of the working clone, and records every mutating call in
//! order so tests can assert on what was attempted.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::GitError;
use crate::model::{
    CommitOutcome, CommitRecord, ConflictKind, ConflictStrategy, GitIdentity, RepositoryInfo,
};
use crate::service::GitService;
use crate::Result;

/// A mutating call observed by [`FakeGit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitCall {
    Clone { url: String, dir: PathBuf },
    CloneBare { url: String, dir: PathBuf },
    CreateBranch { branch: String },
    Checkout { branch: String },
    DeleteBranch { branch: String },
    Fetch { url: String, reference: String },
    CherryPick { sha: String },
    CheckoutPaths { sha: String, paths: Vec<String> },
    RemovePaths { paths: Vec<String> },
    Commit { message: String, paths: Vec<String> },
    SetIdentity { identity: GitIdentity },
    Push { remote_branch: String, force: bool },
}

/// A remote repository: refs plus linear history, oldest first.
#[derive(Debug, Clone, Default)]
pub struct FakeRemote {
    refs: HashMap<String, String>,
    history: Vec<CommitRecord>,
    files: Vec<(String, String)>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point `name` (tag, branch or abbreviated sha) at `sha`.
    pub fn with_ref(mut self, name: &str, sha: &str) -> Self {
        self.refs.insert(name.to_string(), sha.to_string());
        self
    }

    /// Append commits (oldest first); each sha also resolves to itself.
    pub fn with_history(mut self, commits: Vec<CommitRecord>) -> Self {
        for c in &commits {
            self.refs.insert(c.sha.clone(), c.sha.clone());
        }
        self.history.extend(commits);
        self
    }

    /// Write `content` to `path` inside every working clone of this remote.
    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        self.files.push((path.to_string(), content.to_string()));
        self
    }
}

#[derive(Debug)]
struct FakeState {
    remotes: HashMap<String, FakeRemote>,
    clones: HashMap<PathBuf, String>,
    branches: HashSet<String>,
    current: Option<String>,
    head: String,
    commit_counter: u64,
    calls: Vec<GitCall>,
    cherry_pick_failures: HashMap<String, ConflictKind>,
    touches: HashMap<String, Vec<String>>,
    touched: HashSet<String>,
    pending_restore: HashSet<String>,
    absent_paths: HashSet<String>,
    repository: RepositoryInfo,
}

/// In-memory [`GitService`].
#[derive(Debug)]
pub struct FakeGit {
    state: Mutex<FakeState>,
}

impl Default for FakeGit {
    fn default() -> Self {
        let mut branches = HashSet::new();
        branches.insert("master".to_string());
        FakeGit {
            state: Mutex::new(FakeState {
                remotes: HashMap::new(),
                clones: HashMap::new(),
                branches,
                current: Some("master".to_string()),
                head: "initial-head".to_string(),
                commit_counter: 0,
                calls: Vec::new(),
                cherry_pick_failures: HashMap::new(),
                touches: HashMap::new(),
                touched: HashSet::new(),
                pending_restore: HashSet::new(),
                absent_paths: HashSet::new(),
                repository: RepositoryInfo {
                    host: "github.com".to_string(),
                    organisation: "acme".to_string(),
                    name: "environment-dev".to_string(),
                },
            }),
        }
    }
}

impl FakeGit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote(self, url: &str, remote: FakeRemote) -> Self {
        self.state
            .lock()
            .unwrap()
            .remotes
            .insert(url.to_string(), remote);
        self
    }

    /// Make cherry-picking `sha` fail with `kind`.
    pub fn with_cherry_pick_failure(self, sha: &str, kind: ConflictKind) -> Self {
        self.state
            .lock()
            .unwrap()
            .cherry_pick_failures
            .insert(sha.to_string(), kind);
        self
    }

    /// Declare that applying `sha` modifies `paths`.
    pub fn with_commit_touching(self, sha: &str, paths: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .touches
            .insert(sha.to_string(), paths.iter().map(|p| p.to_string()).collect());
        self
    }

    /// Declare that `path` does not exist in the working clone unless a
    /// picked commit touching it adds it.
    pub fn with_absent_path(self, path: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .absent_paths
            .insert(path.to_string());
        self
    }

    pub fn calls(&self) -> Vec<GitCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Shas passed to `cherry_pick`, in call order.
    pub fn cherry_picked(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GitCall::CherryPick { sha } => Some(sha),
                _ => None,
            })
            .collect()
    }

    /// Messages of commits that were actually created.
    pub fn commit_messages(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GitCall::Commit { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn branches(&self) -> HashSet<String> {
        self.state.lock().unwrap().branches.clone()
    }

    fn remote_for<'a>(state: &'a FakeState, dir: &Path) -> Result<&'a FakeRemote> {
        state
            .clones
            .get(dir)
            .and_then(|url| state.remotes.get(url))
            .ok_or_else(|| GitError::CommandFailed {
                args: "rev-list".to_string(),
                stderr: format!("fatal: {} is not a clone of a known remote", dir.display()),
            })
    }

    fn clone_into(&self, url: &str, dir: &Path, bare: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let remote = state
            .remotes
            .get(url)
            .cloned()
            .ok_or_else(|| GitError::CommandFailed {
                args: format!("clone {url}"),
                stderr: format!("fatal: repository '{url}' not found"),
            })?;
        std::fs::create_dir_all(dir)?;
        if !bare {
            for (path, content) in &remote.files {
                let target = dir.join(path);
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(target, content)?;
            }
        }
        state.clones.insert(dir.to_path_buf(), url.to_string());
        state.calls.push(if bare {
            GitCall::CloneBare {
                url: url.to_string(),
                dir: dir.to_path_buf(),
            }
        } else {
            GitCall::Clone {
                url: url.to_string(),
                dir: dir.to_path_buf(),
            }
        });
        Ok(())
    }
}

#[async_trait]
impl GitService for FakeGit {
    async fn clone_repo(&self, url: &str, dir: &Path) -> Result<()> {
        self.clone_into(url, dir, false)
    }

    async fn clone_bare(&self, dir: &Path, url: &str) -> Result<()> {
        self.clone_into(url, dir, true)
    }

    async fn create_branch(&self, _dir: &Path, branch: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.branches.insert(branch.to_string()) {
            return Err(GitError::CommandFailed {
                args: format!("branch {branch}"),
                stderr: format!("fatal: a branch named '{branch}' already exists"),
            });
        }
        state.calls.push(GitCall::CreateBranch {
            branch: branch.to_string(),
        });
        Ok(())
    }

    async fn checkout(&self, dir: &Path, branch: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        // refs of a cloned remote can be checked out directly
        let known_ref = Self::remote_for(&state, dir)
            .map(|r| r.refs.contains_key(branch))
            .unwrap_or(false);
        if !state.branches.contains(branch) && !known_ref {
            return Err(GitError::CommandFailed {
                args: format!("checkout {branch}"),
                stderr: format!("error: pathspec '{branch}' did not match"),
            });
        }
        if state.branches.contains(branch) {
            state.current = Some(branch.to_string());
        }
        state.calls.push(GitCall::Checkout {
            branch: branch.to_string(),
        });
        Ok(())
    }

    async fn current_branch(&self, _dir: &Path) -> Result<Option<String>> {
        Ok(self.state.lock().unwrap().current.clone())
    }

    async fn delete_local_branch(&self, _dir: &Path, branch: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.current.as_deref() == Some(branch) {
            return Err(GitError::CommandFailed {
                args: format!("branch -D {branch}"),
                stderr: format!("error: cannot delete branch '{branch}' checked out"),
            });
        }
        if !state.branches.remove(branch) {
            return Err(GitError::CommandFailed {
                args: format!("branch -D {branch}"),
                stderr: format!("error: branch '{branch}' not found"),
            });
        }
        state.calls.push(GitCall::DeleteBranch {
            branch: branch.to_string(),
        });
        Ok(())
    }

    async fn fetch_branch(&self, _dir: &Path, url: &str, reference: &str) -> Result<()> {
        self.state.lock().unwrap().calls.push(GitCall::Fetch {
            url: url.to_string(),
            reference: reference.to_string(),
        });
        Ok(())
    }

    async fn get_commit_for_tag(&self, dir: &Path, tag: &str) -> Result<String> {
        let state = self.state.lock().unwrap();
        Self::remote_for(&state, dir)?
            .refs
            .get(tag)
            .cloned()
            .ok_or_else(|| GitError::RefNotFound {
                reference: tag.to_string(),
                dir: dir.display().to_string(),
            })
    }

    async fn get_commits_between(
        &self,
        dir: &Path,
        from_sha: &str,
        to_sha: &str,
    ) -> Result<Vec<CommitRecord>> {
        let state = self.state.lock().unwrap();
        let history = &Self::remote_for(&state, dir)?.history;
        let position = |sha: &str| {
            history
                .iter()
                .position(|c| c.sha == sha)
                .ok_or_else(|| GitError::RefNotFound {
                    reference: sha.to_string(),
                    dir: dir.display().to_string(),
                })
        };
        let from = position(from_sha)?;
        let to = position(to_sha)?;
        if to <= from {
            return Ok(Vec::new());
        }
        Ok(history[from + 1..=to].iter().rev().cloned().collect())
    }

    async fn cherry_pick(&self, _dir: &Path, sha: &str, _strategy: ConflictStrategy) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GitCall::CherryPick {
            sha: sha.to_string(),
        });
        if let Some(kind) = state.cherry_pick_failures.get(sha).copied() {
            return Err(GitError::CherryPick {
                sha: sha.to_string(),
                kind,
                stderr: format!("error: could not apply {sha}"),
            });
        }
        if let Some(paths) = state.touches.get(sha).cloned() {
            state.touched.extend(paths);
        }
        state.head = format!("picked-{sha}");
        Ok(())
    }

    async fn checkout_paths_from_commit(
        &self,
        _dir: &Path,
        sha: &str,
        paths: &[String],
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for p in paths {
            if state.touched.remove(p) {
                state.pending_restore.insert(p.clone());
            }
        }
        state.calls.push(GitCall::CheckoutPaths {
            sha: sha.to_string(),
            paths: paths.to_vec(),
        });
        Ok(())
    }

    async fn path_exists_at(&self, _dir: &Path, sha: &str, path: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        if !state.absent_paths.contains(path) {
            return Ok(true);
        }
        // an absent path only shows up at HEAD once a picked commit adds it
        let at_head = sha == "HEAD" || sha == state.head;
        Ok(at_head && state.touched.contains(path))
    }

    async fn remove_paths(&self, _dir: &Path, paths: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for p in paths {
            if state.touched.remove(p) {
                state.pending_restore.insert(p.clone());
            }
        }
        state.calls.push(GitCall::RemovePaths {
            paths: paths.to_vec(),
        });
        Ok(())
    }

    async fn commit_files(
        &self,
        _dir: &Path,
        message: &str,
        paths: &[String],
    ) -> Result<CommitOutcome> {
        let mut state = self.state.lock().unwrap();
        // restored paths only differ from HEAD when replay changed them
        let restore_only = paths
            .iter()
            .all(|p| state.calls.iter().any(|c| restored(c, p)));
        let pending = paths.iter().any(|p| state.pending_restore.contains(p));
        if restore_only && !pending {
            return Ok(CommitOutcome::NothingToCommit);
        }
        for p in paths {
            state.pending_restore.remove(p);
        }
        state.commit_counter += 1;
        let sha = format!("commit-{}", state.commit_counter);
        state.head = sha.clone();
        state.calls.push(GitCall::Commit {
            message: message.to_string(),
            paths: paths.to_vec(),
        });
        Ok(CommitOutcome::Committed { sha })
    }

    async fn head_commit(&self, _dir: &Path) -> Result<String> {
        Ok(self.state.lock().unwrap().head.clone())
    }

    async fn set_user_identity(&self, _dir: &Path, identity: &GitIdentity) -> Result<()> {
        self.state.lock().unwrap().calls.push(GitCall::SetIdentity {
            identity: identity.clone(),
        });
        Ok(())
    }

    async fn repository_info(&self, _dir: &Path) -> Result<RepositoryInfo> {
        Ok(self.state.lock().unwrap().repository.clone())
    }

    async fn push(&self, _dir: &Path, remote_branch: &str, force: bool) -> Result<()> {
        self.state.lock().unwrap().calls.push(GitCall::Push {
            remote_branch: remote_branch.to_string(),
            force,
        });
        Ok(())
    }
}

fn restored(call: &GitCall, path: &str) -> bool {
    match call {
        GitCall::CheckoutPaths { paths, .. } | GitCall::RemovePaths { paths } => {
            paths.iter().any(|p| p == path)
        }
        _ => false,
    }
}
