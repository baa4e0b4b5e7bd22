//! boot-upgrade - upgrade a GitOps boot configuration
//!
//! ## Commands
//!
//! - `upgrade boot`: move the clone to the boot configuration matching the
//!   latest version stream and raise a pull request with the result

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use boot_upgrade_core::{
    level_for, DevEnvironment, GitHubProvider, InstallProfile, ProtectedFileSet, ProviderConfig,
    PullRequestDetails, PullRequestFilter, StaticDevEnvironment, StreamCatalogResolver,
    UpgradeOrchestrator, UpgradeReport, UpgradeServices, UpgradeSettings, UpgradeState,
};
use git_plumbing::{GitCli, GitService};

#[derive(Parser)]
#[command(name = "boot-upgrade")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Upgrade GitOps boot configuration to the latest version stream", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and a JSON report
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upgrade installed components
    Upgrade {
        #[command(subcommand)]
        target: UpgradeTarget,
    },
}

#[derive(Subcommand)]
enum UpgradeTarget {
    /// Upgrade the boot configuration of a GitOps clone
    Boot(BootArgs),
}

#[derive(Args, Debug)]
struct BootArgs {
    /// Boot configuration repository to upgrade from (default: the install profile's)
    #[arg(short = 'u', long = "git-url")]
    git_url: Option<String>,

    /// Version stream repository (default: from jx-requirements.yml)
    #[arg(long = "versions-repo")]
    versions_repo: Option<String>,

    /// Version stream ref currently pinned (default: from jx-requirements.yml)
    #[arg(long = "versions-ref")]
    versions_ref: Option<String>,

    /// GitOps clone to upgrade (default: clone the dev environment)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Install profile supplying default repositories (oss, cloudbees)
    #[arg(long, env = "BOOT_UPGRADE_PROFILE", default_value = "oss")]
    profile: String,

    /// Version stream ref to upgrade to
    #[arg(long, default_value = "master")]
    upgrade_ref: String,

    /// Branch the pull request targets
    #[arg(long, default_value = "master")]
    base_branch: String,

    /// Boot configuration branch whose commits are replayed
    #[arg(long, default_value = "master")]
    config_branch: String,

    /// Path kept at its pre-upgrade content (repeatable)
    #[arg(long = "protected-path", default_values_t = vec!["OWNERS".to_string()])]
    protected_paths: Vec<String>,

    /// Remote branch the upgrade is pushed to
    #[arg(long, default_value = boot_upgrade_core::provider::DEFAULT_PR_BRANCH)]
    pr_branch: String,

    /// Label applied to the pull request (repeatable)
    #[arg(long = "label", default_values_t = vec![boot_upgrade_core::provider::DEFAULT_PR_LABEL.to_string()])]
    labels: Vec<String>,

    /// Pipeline user committing the upgrade
    #[arg(long, env = "BOOT_UPGRADE_PIPELINE_USERNAME", default_value = "")]
    pipeline_username: String,

    /// Email of the pipeline user
    #[arg(long, env = "BOOT_UPGRADE_PIPELINE_USER_EMAIL", default_value = "")]
    pipeline_user_email: String,

    /// Clone URL of the dev environment repository
    #[arg(long, env = "BOOT_UPGRADE_DEV_ENV_URL", default_value = "")]
    dev_env_url: String,

    /// Token used to clone the dev environment
    #[arg(long, env = "GIT_TOKEN", hide_env_values = true)]
    pipeline_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    boot_upgrade_core::init_tracing(cli.json, level_for(cli.verbose));

    match cli.command {
        Commands::Upgrade { target } => match target {
            UpgradeTarget::Boot(args) => cmd_upgrade_boot(args, cli.json).await,
        },
    }
}

fn settings_from_args(args: &BootArgs) -> Result<UpgradeSettings> {
    let profile: InstallProfile = args
        .profile
        .parse()
        .with_context(|| format!("Invalid --profile {}", args.profile))?;
    Ok(UpgradeSettings {
        dir: args.dir.clone(),
        boot_config_url: non_empty(&args.git_url),
        version_stream_url: non_empty(&args.versions_repo),
        version_stream_ref: non_empty(&args.versions_ref),
        profile,
        upgrade_ref: args.upgrade_ref.clone(),
        base_branch: args.base_branch.clone(),
        config_branch: args.config_branch.clone(),
        protected: ProtectedFileSet::new(args.protected_paths.iter().cloned()),
        pull_request: PullRequestDetails {
            branch_name: args.pr_branch.clone(),
            ..PullRequestDetails::default()
        },
        filter: PullRequestFilter {
            labels: args.labels.clone(),
        },
    })
}

fn dev_environment_from_args(args: &BootArgs) -> DevEnvironment {
    DevEnvironment {
        pipeline_username: args.pipeline_username.clone(),
        pipeline_user_email: args.pipeline_user_email.clone(),
        source_url: args.dev_env_url.clone(),
        pipeline_token: non_empty(&args.pipeline_token),
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

async fn cmd_upgrade_boot(args: BootArgs, json: bool) -> Result<()> {
    let settings = settings_from_args(&args)?;

    let git: Arc<dyn GitService> = Arc::new(GitCli::new());
    let provider = GitHubProvider::new(ProviderConfig::from_env(), git.clone())
        .context("Failed to create pull request provider")?;
    let services = UpgradeServices {
        git: git.clone(),
        versions: Arc::new(StreamCatalogResolver::new(git.clone())),
        provider: Arc::new(provider),
        dev_environment: Arc::new(StaticDevEnvironment::new(dev_environment_from_args(&args))),
    };

    let report = UpgradeOrchestrator::new(settings, services)
        .run()
        .await
        .context("Boot configuration upgrade failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &UpgradeReport) {
    if report.final_state == UpgradeState::NoUpgrade {
        println!("No upgrade available");
        return;
    }
    if let Some(candidate) = &report.candidate_commit {
        println!("Version stream: {}", candidate);
    }
    match (&report.delta, &report.replay) {
        (Some(delta), Some(replay)) => {
            println!(
                "Boot config:    {} -> {}",
                delta.from.version_label, delta.to.version_label
            );
            println!(
                "Replayed:       {} applied, {} skipped",
                replay.applied().count(),
                replay.skipped().count()
            );
        }
        _ => println!("Boot config:    no boot config upgrade available"),
    }
    if let Some(pr) = &report.pull_request {
        info!(url = %pr.url, "upgrade complete");
        println!("Pull request:   {}", pr.url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> BootArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Upgrade {
                target: UpgradeTarget::Boot(args),
            } => args,
        }
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["boot-upgrade", "upgrade", "boot"]);
        let settings = settings_from_args(&args).unwrap();
        assert_eq!(settings.profile, InstallProfile::Oss);
        assert_eq!(settings.upgrade_ref, "master");
        assert_eq!(settings.protected.paths(), ["OWNERS".to_string()]);
        assert_eq!(settings.pull_request.branch_name, "boot-config-upgrade");
        assert_eq!(settings.filter.labels, vec!["boot-upgrade"]);
        assert!(settings.dir.is_none());
        assert!(settings.version_stream_url.is_none());
    }

    #[test]
    fn test_upgrade_boot_flags() {
        let args = parse(&[
            "boot-upgrade",
            "upgrade",
            "boot",
            "-u",
            "https://github.com/acme/boot-config.git",
            "--versions-repo",
            "https://github.com/acme/versions.git",
            "--versions-ref",
            "v1.2.3",
            "-d",
            "/work/env",
            "--protected-path",
            "OWNERS",
            "--protected-path",
            "OWNERS_ALIASES",
        ]);
        let settings = settings_from_args(&args).unwrap();
        assert_eq!(
            settings.boot_config_url.as_deref(),
            Some("https://github.com/acme/boot-config.git")
        );
        assert_eq!(settings.version_stream_ref.as_deref(), Some("v1.2.3"));
        assert_eq!(settings.dir, Some(PathBuf::from("/work/env")));
        assert_eq!(settings.protected.paths().len(), 2);
    }

    #[test]
    fn test_unknown_profile_is_rejected() {
        let args = parse(&["boot-upgrade", "upgrade", "boot", "--profile", "enterprise"]);
        assert!(settings_from_args(&args).is_err());
    }

    #[test]
    fn test_blank_flags_count_as_unset() {
        let args = parse(&["boot-upgrade", "upgrade", "boot", "--versions-ref", " "]);
        assert!(settings_from_args(&args).unwrap().version_stream_ref.is_none());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["boot-upgrade", "upgrade", "boot", "--json", "-v"]).unwrap();
        assert!(cli.json);
        assert!(cli.verbose);
    }
}
