//! boot-upgrade-core: computing and applying boot configuration upgrades
//!
//! An upgrade moves a GitOps clone from the version stream it pins to a
//! newer one. The boot configuration commits separating the two stream
//! states are replayed onto a fresh working branch, locally owned files are
//! restored, the pinned stream reference is advanced, and the result is
//! raised as a pull request.
//!
//! The pieces, leaves first:
//!
//! - [`ReferenceResolver`]: tags, branches and commit ids to commits
//! - [`UpgradeAvailabilityChecker`]: has the stream moved?
//! - [`ConfigDeltaComputer`]: which boot configuration commits to replay
//! - [`ReplayEngine`] and [`ProtectedFileGuard`]: applying them
//! - [`UpgradeOrchestrator`]: the [`UpgradeState`] machine tying it together

pub mod availability;
pub mod delta;
pub mod dev_env;
pub mod error;
pub mod fakes;
pub mod guard;
pub mod model;
pub mod obs;
pub mod orchestrator;
pub mod profile;
pub mod provider;
pub mod replay;
pub mod requirements;
pub mod resolver;
pub mod state;
pub mod telemetry;
pub mod versions;

pub use availability::UpgradeAvailabilityChecker;
pub use delta::{version_tag, ConfigDeltaComputer};
pub use dev_env::{DevEnvironment, DevEnvironmentSource, StaticDevEnvironment};
pub use error::{Result, UpgradeError};
pub use guard::ProtectedFileGuard;
pub use model::{ProtectedFileSet, ResolvedRevision, UpgradeDelta, VersionStreamRef, WorkingBranch};
pub use orchestrator::{UpgradeOrchestrator, UpgradeReport, UpgradeServices, UpgradeSettings};
pub use profile::{determine_boot_config_url, InstallProfile, StreamDefaults};
pub use provider::{
    GitHubProvider, ProviderConfig, ProviderError, PullRequestDetails, PullRequestFilter,
    PullRequestInfo, PullRequestProvider, RepositoryHandle,
};
pub use replay::{ReplayAction, ReplayEngine, ReplayEntry, ReplayReport};
pub use requirements::Requirements;
pub use resolver::ReferenceResolver;
pub use state::{Transition, UpgradeState};
pub use telemetry::{init_tracing, level_for};
pub use versions::{ComponentVersionResolver, StreamCatalogResolver};
