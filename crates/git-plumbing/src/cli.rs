//! [`GitService`] backed by the `git` executable.

use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::GitError;
use crate::model::{
    CommitOutcome, CommitRecord, ConflictKind, ConflictStrategy, GitIdentity, RepositoryInfo,
};
use crate::service::GitService;
use crate::url::parse_repository_url;
use crate::Result;

const MERGE_WITHOUT_MAINLINE: &str = "is a merge but no -m option was given";

const GIT_PROGRAM: &str = "git";

/// Runs git as a child process for every operation.
///
/// Commits use the identity configured in the clone, see
/// [`GitService::set_user_identity`].
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        GitCli
    }

    async fn output<I, S>(&self, dir: Option<&Path>, args: I) -> Result<(String, Output)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        let described = describe_args(&args);

        let mut cmd = Command::new(GIT_PROGRAM);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }

        debug!(command = %described, "running git");
        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GitError::GitNotFound
            } else {
                GitError::Io(e)
            }
        })?;
        Ok((described, output))
    }

    /// Run git and return trimmed stdout, failing on a non-zero exit.
    async fn run<I, S>(&self, dir: Option<&Path>, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let (described, output) = self.output(dir, args).await?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                args: described,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn parent_count(&self, dir: &Path, sha: &str) -> Result<usize> {
        let line = self
            .run(Some(dir), ["rev-list", "--parents", "-n", "1", sha])
            .await?;
        Ok(line.split_whitespace().count().saturating_sub(1))
    }

    async fn classify_cherry_pick_failure(&self, dir: &Path, sha: &str, stderr: &str) -> ConflictKind {
        match self.parent_count(dir, sha).await {
            Ok(n) if n > 1 => return ConflictKind::MergeCommitNoParentSelected,
            Ok(_) => {}
            // object may be missing locally; fall back to the message text
            Err(_) if stderr.contains(MERGE_WITHOUT_MAINLINE) => {
                return ConflictKind::MergeCommitNoParentSelected
            }
            Err(_) => {}
        }
        if stderr.contains("CONFLICT") || stderr.contains("could not apply") {
            ConflictKind::ContentConflict
        } else {
            ConflictKind::Other
        }
    }
}

#[async_trait]
impl GitService for GitCli {
    async fn clone_repo(&self, url: &str, dir: &Path) -> Result<()> {
        self.run(None, [OsStr::new("clone"), OsStr::new(url), dir.as_os_str()])
            .await
            .map(|_| ())
    }

    async fn clone_bare(&self, dir: &Path, url: &str) -> Result<()> {
        self.run(
            None,
            [
                OsStr::new("clone"),
                OsStr::new("--bare"),
                OsStr::new(url),
                dir.as_os_str(),
            ],
        )
        .await
        .map(|_| ())
    }

    async fn create_branch(&self, dir: &Path, branch: &str) -> Result<()> {
        self.run(Some(dir), ["branch", branch]).await.map(|_| ())
    }

    async fn checkout(&self, dir: &Path, branch: &str) -> Result<()> {
        self.run(Some(dir), ["checkout", branch]).await.map(|_| ())
    }

    async fn current_branch(&self, dir: &Path) -> Result<Option<String>> {
        let (described, output) = self
            .output(Some(dir), ["symbolic-ref", "--quiet", "--short", "HEAD"])
            .await?;
        match output.status.code() {
            Some(0) => Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            )),
            // --quiet exits 1 without output on a detached HEAD
            Some(1) if output.stderr.is_empty() => Ok(None),
            _ => Err(GitError::CommandFailed {
                args: described,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    async fn delete_local_branch(&self, dir: &Path, branch: &str) -> Result<()> {
        self.run(Some(dir), ["branch", "-D", branch]).await.map(|_| ())
    }

    async fn fetch_branch(&self, dir: &Path, url: &str, reference: &str) -> Result<()> {
        self.run(Some(dir), ["fetch", url, reference]).await.map(|_| ())
    }

    async fn get_commit_for_tag(&self, dir: &Path, tag: &str) -> Result<String> {
        let sha = self
            .run(Some(dir), ["rev-list", "-n", "1", tag, "--"])
            .await
            .map_err(|e| match e {
                GitError::CommandFailed { .. } => GitError::RefNotFound {
                    reference: tag.to_string(),
                    dir: dir.display().to_string(),
                },
                other => other,
            })?;
        if sha.is_empty() {
            return Err(GitError::RefNotFound {
                reference: tag.to_string(),
                dir: dir.display().to_string(),
            });
        }
        Ok(sha)
    }

    async fn get_commits_between(
        &self,
        dir: &Path,
        from_sha: &str,
        to_sha: &str,
    ) -> Result<Vec<CommitRecord>> {
        let range = format!("{from_sha}..{to_sha}");
        let out = self
            .run(Some(dir), ["log", "--format=%H%x1f%P%x1f%s", range.as_str()])
            .await?;
        out.lines()
            .filter(|l| !l.trim().is_empty())
            .map(parse_log_line)
            .collect()
    }

    async fn cherry_pick(&self, dir: &Path, sha: &str, strategy: ConflictStrategy) -> Result<()> {
        let mut args = vec!["cherry-pick"];
        match strategy {
            ConflictStrategy::Theirs => args.extend(["--strategy=recursive", "-X", "theirs"]),
        }
        args.push(sha);

        let (_, output) = self.output(Some(dir), &args).await?;
        if output.status.success() {
            return Ok(());
        }

        let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.contains("CONFLICT") {
            stderr = format!("{stderr}\n{}", stdout.trim());
        }
        let kind = self.classify_cherry_pick_failure(dir, sha, &stderr).await;
        Err(GitError::CherryPick {
            sha: sha.to_string(),
            kind,
            stderr,
        })
    }

    async fn checkout_paths_from_commit(
        &self,
        dir: &Path,
        sha: &str,
        paths: &[String],
    ) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["checkout".to_string(), sha.to_string(), "--".to_string()];
        args.extend(paths.iter().cloned());
        self.run(Some(dir), &args).await.map(|_| ())
    }

    async fn path_exists_at(&self, dir: &Path, sha: &str, path: &str) -> Result<bool> {
        let object = format!("{sha}:{path}");
        let (_, output) = self.output(Some(dir), ["cat-file", "-e", object.as_str()]).await?;
        Ok(output.status.success())
    }

    async fn remove_paths(&self, dir: &Path, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec![
            "rm".to_string(),
            "-q".to_string(),
            "-r".to_string(),
            "--ignore-unmatch".to_string(),
            "--".to_string(),
        ];
        args.extend(paths.iter().cloned());
        self.run(Some(dir), &args).await.map(|_| ())
    }

    async fn commit_files(
        &self,
        dir: &Path,
        message: &str,
        paths: &[String],
    ) -> Result<CommitOutcome> {
        // pathspecs that match nothing make `git add` fail, so deletions are
        // staged separately
        let (present, missing): (Vec<&String>, Vec<&String>) =
            paths.iter().partition(|p| dir.join(p.as_str()).exists());
        if !present.is_empty() {
            let mut add = vec!["add".to_string(), "-A".to_string(), "--".to_string()];
            add.extend(present.into_iter().cloned());
            self.run(Some(dir), &add).await?;
        }
        if !missing.is_empty() {
            let mut rm = vec![
                "rm".to_string(),
                "--cached".to_string(),
                "-q".to_string(),
                "-r".to_string(),
                "--ignore-unmatch".to_string(),
                "--".to_string(),
            ];
            rm.extend(missing.into_iter().cloned());
            self.run(Some(dir), &rm).await?;
        }

        // only staged changes become pathspecs: `git commit` rejects a
        // pathspec git knows nothing about
        let mut diff = vec![
            "diff".to_string(),
            "--cached".to_string(),
            "--name-only".to_string(),
            "-z".to_string(),
            "--".to_string(),
        ];
        diff.extend(paths.iter().cloned());
        let staged = self.run(Some(dir), &diff).await?;
        let changed: Vec<&str> = staged.split('\0').filter(|p| !p.is_empty()).collect();
        if changed.is_empty() {
            return Ok(CommitOutcome::NothingToCommit);
        }

        let mut commit = vec!["commit", "-m", message, "--"];
        commit.extend(changed);
        self.run(Some(dir), &commit).await?;

        let sha = self.head_commit(dir).await?;
        Ok(CommitOutcome::Committed { sha })
    }

    async fn head_commit(&self, dir: &Path) -> Result<String> {
        let sha = self.run(Some(dir), ["rev-parse", "HEAD"]).await?;
        if sha.is_empty() {
            return Err(GitError::Parse(
                "git rev-parse HEAD returned empty output".to_string(),
            ));
        }
        Ok(sha)
    }

    async fn set_user_identity(&self, dir: &Path, identity: &GitIdentity) -> Result<()> {
        self.run(Some(dir), ["config", "user.name", identity.name.as_str()])
            .await?;
        self.run(Some(dir), ["config", "user.email", identity.email.as_str()])
            .await?;
        Ok(())
    }

    async fn repository_info(&self, dir: &Path) -> Result<RepositoryInfo> {
        let url = self.run(Some(dir), ["remote", "get-url", "origin"]).await?;
        parse_repository_url(&url)
    }

    async fn push(&self, dir: &Path, remote_branch: &str, force: bool) -> Result<()> {
        let refspec = format!("HEAD:refs/heads/{remote_branch}");
        let mut args = vec!["push"];
        if force {
            args.push("--force");
        }
        args.extend(["origin", refspec.as_str()]);
        self.run(Some(dir), &args).await.map(|_| ())
    }
}

/// Parse one `%H%x1f%P%x1f%s` log line.
fn parse_log_line(line: &str) -> Result<CommitRecord> {
    let mut fields = line.splitn(3, '\u{1f}');
    let sha = fields
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GitError::Parse(format!("log line without sha: {line}")))?;
    let parents = fields.next().unwrap_or("");
    let subject = fields.next().unwrap_or("");
    Ok(CommitRecord::new(
        sha.trim(),
        subject,
        parents.split_whitespace().count() > 1,
    ))
}

/// Render arguments for logs and errors with URL credentials masked.
fn describe_args(args: &[OsString]) -> String {
    args.iter()
        .map(|a| redact_credentials(&a.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn redact_credentials(arg: &str) -> String {
    if let Some((scheme, rest)) = arg.split_once("://") {
        let authority_end = rest.find('/').unwrap_or(rest.len());
        if let Some(at) = rest[..authority_end].rfind('@') {
            return format!("{scheme}://***@{}", &rest[at + 1..]);
        }
    }
    arg.to_string()
}
