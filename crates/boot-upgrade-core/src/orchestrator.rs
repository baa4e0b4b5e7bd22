//! Sequencing a full upgrade run.
//!
//! The orchestrator owns the run context and performs exactly one
//! side-effecting step per [`UpgradeState`]. Each step reports a
//! [`Transition`] which [`UpgradeState::advance`] turns into the next
//! state. Any failure aborts the run; a working branch created before the
//! failure is left in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use git_plumbing::{GitIdentity, GitService};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::availability::UpgradeAvailabilityChecker;
use crate::delta::ConfigDeltaComputer;
use crate::dev_env::{DevEnvironment, DevEnvironmentSource};
use crate::error::{Result, UpgradeError};
use crate::guard::ProtectedFileGuard;
use crate::model::{ProtectedFileSet, UpgradeDelta, VersionStreamRef, WorkingBranch};
use crate::obs::{self, UpgradeSpan};
use crate::profile::{determine_boot_config_url, InstallProfile};
use crate::provider::{PullRequestDetails, PullRequestFilter, PullRequestInfo, PullRequestProvider};
use crate::replay::{ReplayEngine, ReplayReport};
use crate::requirements::Requirements;
use crate::resolver::ReferenceResolver;
use crate::state::{Transition, UpgradeState};
use crate::versions::ComponentVersionResolver;

pub const VERSION_STREAM_COMMIT_MESSAGE: &str = "feat: upgrade version stream";

/// What to upgrade and how.
#[derive(Debug, Clone)]
pub struct UpgradeSettings {
    /// Existing GitOps clone; the dev environment is cloned when unset
    pub dir: Option<PathBuf>,
    /// Boot configuration repository overriding the profile default
    pub boot_config_url: Option<String>,
    pub version_stream_url: Option<String>,
    pub version_stream_ref: Option<String>,
    pub profile: InstallProfile,
    /// Version stream reference to upgrade to
    pub upgrade_ref: String,
    /// Branch the pull request targets and the clone returns to
    pub base_branch: String,
    /// Boot configuration branch fetched before replaying its commits
    pub config_branch: String,
    pub protected: ProtectedFileSet,
    pub pull_request: PullRequestDetails,
    pub filter: PullRequestFilter,
}

impl Default for UpgradeSettings {
    fn default() -> Self {
        UpgradeSettings {
            dir: None,
            boot_config_url: None,
            version_stream_url: None,
            version_stream_ref: None,
            profile: InstallProfile::default(),
            upgrade_ref: "master".to_string(),
            base_branch: "master".to_string(),
            config_branch: "master".to_string(),
            protected: ProtectedFileSet::default(),
            pull_request: PullRequestDetails::default(),
            filter: PullRequestFilter::default(),
        }
    }
}

/// Collaborators an upgrade run talks to.
#[derive(Clone)]
pub struct UpgradeServices {
    pub git: Arc<dyn GitService>,
    pub versions: Arc<dyn ComponentVersionResolver>,
    pub provider: Arc<dyn PullRequestProvider>,
    pub dev_environment: Arc<dyn DevEnvironmentSource>,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct UpgradeReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub final_state: UpgradeState,
    pub trail: Vec<UpgradeState>,
    pub working_dir: Option<PathBuf>,
    pub version_stream: Option<VersionStreamRef>,
    pub candidate_commit: Option<String>,
    pub working_branch: Option<WorkingBranch>,
    pub boot_config_url: Option<String>,
    pub delta: Option<UpgradeDelta>,
    pub replay: Option<ReplayReport>,
    pub restore_commit: Option<String>,
    pub pinned_ref_commit: Option<String>,
    pub pull_request: Option<PullRequestInfo>,
}

impl UpgradeReport {
    /// The run went all the way to a pull request.
    pub fn upgraded(&self) -> bool {
        self.final_state == UpgradeState::BranchCleaned
    }
}

#[derive(Default)]
struct RunContext {
    dev_environment: Option<DevEnvironment>,
    identity: Option<GitIdentity>,
    dir: Option<PathBuf>,
    stream: Option<VersionStreamRef>,
    candidate: Option<String>,
    branch: Option<WorkingBranch>,
    boot_config_url: Option<String>,
    delta: Option<UpgradeDelta>,
    pre_upgrade_commit: Option<String>,
    replay: Option<ReplayReport>,
    restore_commit: Option<String>,
    pinned_ref_commit: Option<String>,
    pull_request: Option<PullRequestInfo>,
}

fn require<'a, T>(value: &'a Option<T>, state: UpgradeState, what: &str) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| UpgradeError::InvalidTransition {
        state: state.to_string(),
        transition: format!("step requires {what}"),
    })
}

pub struct UpgradeOrchestrator {
    settings: UpgradeSettings,
    services: UpgradeServices,
}

impl UpgradeOrchestrator {
    pub fn new(settings: UpgradeSettings, services: UpgradeServices) -> Self {
        Self { settings, services }
    }

    /// Run the upgrade to a terminal state.
    pub async fn run(&self) -> Result<UpgradeReport> {
        // the run id doubles as the working branch name
        let planned_branch = WorkingBranch::unique();
        let run_id = planned_branch.to_string();
        let _span = UpgradeSpan::enter(&run_id);
        let started_at = Utc::now();
        let dir_label = self.settings.dir.as_ref().map(|d| d.display().to_string());
        obs::emit_upgrade_started(&run_id, dir_label.as_deref(), &self.settings.upgrade_ref);

        let mut ctx = RunContext::default();
        let mut state = UpgradeState::Init;
        let mut trail = vec![state];

        while !state.is_terminal() {
            let step = self.step(state, &planned_branch, &mut ctx).await;
            match step.and_then(|t| state.advance(t)) {
                Ok(next) => {
                    state = next;
                    obs::emit_state_entered(&run_id, &state.to_string());
                    trail.push(state);
                }
                Err(source) => {
                    obs::emit_upgrade_finished(
                        &run_id,
                        &state.to_string(),
                        elapsed_ms(started_at),
                        false,
                    );
                    return Err(UpgradeError::Aborted {
                        state,
                        branch: ctx.branch.as_ref().map(WorkingBranch::to_string),
                        source: Box::new(source),
                    });
                }
            }
        }

        obs::emit_upgrade_finished(&run_id, &state.to_string(), elapsed_ms(started_at), true);
        Ok(UpgradeReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            final_state: state,
            trail,
            working_dir: ctx.dir,
            version_stream: ctx.stream,
            candidate_commit: ctx.candidate,
            working_branch: ctx.branch,
            boot_config_url: ctx.boot_config_url,
            delta: ctx.delta,
            replay: ctx.replay,
            restore_commit: ctx.restore_commit,
            pinned_ref_commit: ctx.pinned_ref_commit,
            pull_request: ctx.pull_request,
        })
    }

    async fn step(
        &self,
        state: UpgradeState,
        planned_branch: &WorkingBranch,
        ctx: &mut RunContext,
    ) -> Result<Transition> {
        let git = &self.services.git;
        match state {
            UpgradeState::Init => {
                let env = self.services.dev_environment.dev_environment().await?;
                let identity = env.identity()?;
                if let Some(dir) = &self.settings.dir {
                    git.set_user_identity(dir, &identity)
                        .await
                        .map_err(UpgradeError::git("config user.name/user.email"))?;
                }
                ctx.dev_environment = Some(env);
                ctx.identity = Some(identity);
                Ok(Transition::IdentityConfigured)
            }

            UpgradeState::GitIdentityConfigured => {
                let dir = match &self.settings.dir {
                    Some(dir) => dir.clone(),
                    None => self.clone_dev_environment(state, ctx).await?,
                };
                ctx.dir = Some(dir);
                Ok(Transition::RepositoryReady)
            }

            UpgradeState::Cloned => {
                let dir = require(&ctx.dir, state, "a working clone")?.clone();
                let stream = self.version_stream(&dir)?;
                info!(stream = %stream, candidate = %self.settings.upgrade_ref, "checking for version stream upgrade");
                let checker =
                    UpgradeAvailabilityChecker::new(ReferenceResolver::new(git.clone()));
                let candidate = checker.check(&stream, &self.settings.upgrade_ref).await?;
                let upgrade_available = candidate.is_some();
                ctx.stream = Some(stream);
                ctx.candidate = candidate;
                Ok(Transition::StreamChecked { upgrade_available })
            }

            UpgradeState::StreamUpgradeChecked => {
                if ctx.candidate.is_none() {
                    return Ok(Transition::StreamChecked {
                        upgrade_available: false,
                    });
                }
                let dir = require(&ctx.dir, state, "a working clone")?;
                let branch = planned_branch.clone();
                git.create_branch(dir, branch.as_str())
                    .await
                    .map_err(UpgradeError::git(format!("branch {branch}")))?;
                git.checkout(dir, branch.as_str())
                    .await
                    .map_err(UpgradeError::git(format!("checkout {branch}")))?;
                info!(branch = %branch, "created working branch");
                ctx.branch = Some(branch);
                Ok(Transition::BranchCreated)
            }

            UpgradeState::BranchCreated => {
                let stream = require(&ctx.stream, state, "a version stream")?;
                let candidate = require(&ctx.candidate, state, "a candidate commit")?;
                let boot_config_url =
                    determine_boot_config_url(self.settings.boot_config_url.as_deref(), &stream.url)?;
                let computer =
                    ConfigDeltaComputer::new(git.clone(), self.services.versions.clone());
                let delta = computer
                    .compute_delta(&stream.url, &boot_config_url, &stream.git_ref, candidate)
                    .await?;
                let empty = delta.is_empty();
                ctx.boot_config_url = Some(boot_config_url);
                ctx.delta = Some(delta);
                Ok(Transition::ConfigDeltaComputed { empty })
            }

            UpgradeState::ConfigDeltaChecked => {
                let delta = require(&ctx.delta, state, "a config delta")?;
                if delta.is_empty() {
                    return Ok(Transition::ConfigDeltaComputed { empty: true });
                }
                let dir = require(&ctx.dir, state, "a working clone")?;
                let branch = require(&ctx.branch, state, "a working branch")?;
                let boot_config_url = require(&ctx.boot_config_url, state, "a boot config URL")?;

                git.fetch_branch(dir, boot_config_url, &self.settings.config_branch)
                    .await
                    .map_err(UpgradeError::git(format!(
                        "fetch {boot_config_url} {}",
                        self.settings.config_branch
                    )))?;
                let pre_upgrade = git
                    .head_commit(dir)
                    .await
                    .map_err(UpgradeError::git("rev-parse HEAD"))?;
                let report = ReplayEngine::new(git.clone())
                    .replay(dir, branch, delta)
                    .await?;
                ctx.pre_upgrade_commit = Some(pre_upgrade);
                ctx.replay = Some(report);
                Ok(Transition::CommitsReplayed)
            }

            UpgradeState::Replayed => {
                let dir = require(&ctx.dir, state, "a working clone")?;
                let pre_upgrade = require(&ctx.pre_upgrade_commit, state, "a pre-upgrade commit")?;
                let restored = ProtectedFileGuard::new(git.clone())
                    .restore(dir, pre_upgrade, &self.settings.protected)
                    .await?;
                ctx.restore_commit = restored;
                Ok(Transition::ProtectedFilesRestored)
            }

            UpgradeState::NoConfigUpgrade | UpgradeState::Guarded => {
                let dir = require(&ctx.dir, state, "a working clone")?.clone();
                let candidate = require(&ctx.candidate, state, "a candidate commit")?.clone();
                ctx.pinned_ref_commit = self.update_pinned_ref(&dir, &candidate).await?;
                Ok(Transition::PinnedRefUpdated)
            }

            UpgradeState::PinnedRefUpdated => {
                let dir = require(&ctx.dir, state, "a working clone")?;
                let info = git
                    .repository_info(dir)
                    .await
                    .map_err(UpgradeError::git("remote get-url origin"))?;
                let repo = self
                    .services
                    .provider
                    .get_repository(&info.organisation, &info.name)
                    .await?;
                let pr = self
                    .services
                    .provider
                    .push_and_create_pull_request(
                        dir,
                        &repo,
                        &self.settings.base_branch,
                        &self.settings.pull_request,
                        &self.settings.filter,
                    )
                    .await?;
                info!(url = %pr.url, number = pr.number, "raised upgrade pull request");
                ctx.pull_request = Some(pr);
                Ok(Transition::PullRequestRaised)
            }

            UpgradeState::PrRaised => {
                let dir = require(&ctx.dir, state, "a working clone")?;
                let branch = require(&ctx.branch, state, "a working branch")?;
                git.checkout(dir, &self.settings.base_branch)
                    .await
                    .map_err(UpgradeError::git(format!(
                        "checkout {}",
                        self.settings.base_branch
                    )))?;
                git.delete_local_branch(dir, branch.as_str())
                    .await
                    .map_err(UpgradeError::git(format!("branch -D {branch}")))?;
                debug!(branch = %branch, "deleted working branch");
                Ok(Transition::BranchCleaned)
            }

            UpgradeState::NoUpgrade | UpgradeState::BranchCleaned => {
                Err(UpgradeError::InvalidTransition {
                    state: state.to_string(),
                    transition: "step from terminal state".to_string(),
                })
            }
        }
    }

    async fn clone_dev_environment(
        &self,
        state: UpgradeState,
        ctx: &RunContext,
    ) -> Result<PathBuf> {
        let env = require(&ctx.dev_environment, state, "a dev environment")?;
        let identity = require(&ctx.identity, state, "a git identity")?;
        let url = env.clone_url()?;
        let dir = std::env::temp_dir().join(format!("boot-upgrade-{}", uuid::Uuid::new_v4()));
        info!(url = %env.source_url, dir = %dir.display(), "cloning dev environment");
        self.services
            .git
            .clone_repo(&url, &dir)
            .await
            .map_err(UpgradeError::git(format!("clone {}", env.source_url)))?;
        self.services
            .git
            .set_user_identity(&dir, identity)
            .await
            .map_err(UpgradeError::git("config user.name/user.email"))?;
        Ok(dir)
    }

    /// Version stream to upgrade from: explicit settings, then the
    /// requirements file, then the install profile's default.
    fn version_stream(&self, dir: &Path) -> Result<VersionStreamRef> {
        let stream = match (
            &self.settings.version_stream_url,
            &self.settings.version_stream_ref,
        ) {
            (None, None) => Requirements::load(dir)?.version_stream(),
            (url, git_ref) => VersionStreamRef::new(
                url.clone().unwrap_or_default(),
                git_ref.clone().unwrap_or_default(),
            ),
        };
        if stream.is_complete() {
            return Ok(stream);
        }
        let fallback = self.settings.profile.default_stream();
        warn!(
            url = %stream.url,
            git_ref = %stream.git_ref,
            profile = %self.settings.profile,
            "incomplete version stream reference, using {}",
            fallback
        );
        Ok(fallback)
    }

    async fn update_pinned_ref(&self, dir: &Path, candidate: &str) -> Result<Option<String>> {
        let mut requirements = Requirements::load(dir)?;
        if !requirements.set_version_stream_ref(candidate) {
            debug!(candidate, "pinned version stream ref already up to date");
            return Ok(None);
        }
        requirements.save()?;
        let path = requirements
            .path()
            .strip_prefix(dir)
            .unwrap_or(requirements.path())
            .to_string_lossy()
            .to_string();
        let outcome = self
            .services
            .git
            .commit_files(dir, VERSION_STREAM_COMMIT_MESSAGE, &[path])
            .await
            .map_err(UpgradeError::git("commit requirements"))?;
        info!(version_stream_ref = candidate, "updated pinned version stream ref");
        Ok(outcome.sha().map(str::to_string))
    }
}

fn elapsed_ms(started_at: DateTime<Utc>) -> u64 {
    (Utc::now() - started_at).num_milliseconds().max(0) as u64
}
