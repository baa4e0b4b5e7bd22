//! Code-hosting provider: pushing the upgrade and raising its pull request.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use git_plumbing::{GitError, GitService};
use reqwest::header::ACCEPT;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DEFAULT_PR_BRANCH: &str = "boot-config-upgrade";
pub const DEFAULT_PR_LABEL: &str = "boot-upgrade";
pub const PR_TITLE: &str = "feat(config): upgrade configuration";
pub const PR_MESSAGE: &str = "Upgrade configuration";

const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("boot-upgrade/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} returned {status}: {message}")]
    Api {
        method: String,
        url: String,
        status: u16,
        message: String,
    },

    #[error("failed to push branch {branch}: {source}")]
    Push {
        branch: String,
        #[source]
        source: GitError,
    },

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// A repository as known to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryHandle {
    pub organisation: String,
    pub name: String,
    pub clone_url: String,
    pub default_branch: String,
    pub html_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestDetails {
    /// Remote branch the working branch is pushed to
    pub branch_name: String,
    pub title: String,
    pub message: String,
}

impl Default for PullRequestDetails {
    fn default() -> Self {
        PullRequestDetails {
            branch_name: DEFAULT_PR_BRANCH.to_string(),
            title: PR_TITLE.to_string(),
            message: PR_MESSAGE.to_string(),
        }
    }
}

/// Labels identifying upgrade pull requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestFilter {
    pub labels: Vec<String>,
}

impl Default for PullRequestFilter {
    fn default() -> Self {
        PullRequestFilter {
            labels: vec![DEFAULT_PR_LABEL.to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub number: u64,
    pub url: String,
    /// An open pull request for the branch already existed
    pub reused: bool,
}

#[async_trait]
pub trait PullRequestProvider: Send + Sync {
    async fn get_repository(&self, organisation: &str, name: &str)
        -> ProviderResult<RepositoryHandle>;

    /// Push the checked-out branch of `dir` and open (or reuse) a pull
    /// request from it into `base`.
    async fn push_and_create_pull_request(
        &self,
        dir: &Path,
        repo: &RepositoryHandle,
        base: &str,
        details: &PullRequestDetails,
        filter: &PullRequestFilter,
    ) -> ProviderResult<PullRequestInfo>;
}

/// GitHub connection settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_url: String,
    pub token: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            api_url: normalize_api_url(
                &std::env::var("GITHUB_API_URL")
                    .unwrap_or_else(|_| DEFAULT_GITHUB_API_URL.to_string()),
            ),
            token: std::env::var("GIT_TOKEN")
                .or_else(|_| std::env::var("GITHUB_TOKEN"))
                .ok()
                .filter(|t| !t.is_empty()),
        }
    }
}

impl ProviderConfig {
    /// Read `GITHUB_API_URL` and `GIT_TOKEN` (or `GITHUB_TOKEN`).
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn new(api_url: &str) -> Self {
        ProviderConfig {
            api_url: normalize_api_url(api_url),
            token: None,
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

fn normalize_api_url(api_url: &str) -> String {
    api_url.trim().trim_end_matches('/').to_string()
}

#[derive(Debug, Deserialize)]
struct GhOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GhRepository {
    name: String,
    owner: GhOwner,
    clone_url: String,
    default_branch: String,
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct GhRef {
    #[serde(rename = "ref")]
    git_ref: String,
}

#[derive(Debug, Deserialize)]
struct GhPull {
    number: u64,
    html_url: String,
    head: GhRef,
}

#[derive(Debug, Deserialize)]
struct GhError {
    message: String,
}

#[derive(Debug, Serialize)]
struct PullBody<'a> {
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    head: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    base: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct LabelsBody<'a> {
    labels: &'a [String],
}

/// [`PullRequestProvider`] backed by the GitHub REST API.
pub struct GitHubProvider {
    config: ProviderConfig,
    http_client: reqwest::Client,
    git: Arc<dyn GitService>,
}

impl GitHubProvider {
    pub fn new(config: ProviderConfig, git: Arc<dyn GitService>) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| ProviderError::Http {
                url: config.api_url.clone(),
                source,
            })?;
        Ok(GitHubProvider {
            config,
            http_client,
            git,
        })
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .http_client
            .request(method, url)
            .header(ACCEPT, "application/vnd.github+json");
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> ProviderResult<T> {
        self.execute(Method::GET, url, self.request(Method::GET, url))
            .await
    }

    async fn send_json<B, T>(&self, method: Method, url: &str, body: &B) -> ProviderResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let builder = self.request(method.clone(), url).json(body);
        self.execute(method, url, builder).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        builder: reqwest::RequestBuilder,
    ) -> ProviderResult<T> {
        let response = builder.send().await.map_err(|source| ProviderError::Http {
            url: url.to_string(),
            source,
        })?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                method: method.to_string(),
                url: url.to_string(),
                status: status.as_u16(),
                message: api_message(&text),
            });
        }
        response.json::<T>().await.map_err(|source| ProviderError::Http {
            url: url.to_string(),
            source,
        })
    }

    async fn open_pulls_for(
        &self,
        repo: &RepositoryHandle,
        branch: &str,
    ) -> ProviderResult<Vec<GhPull>> {
        let url = format!(
            "{}?state=open&head={}:{}",
            pulls_url(&self.config.api_url, &repo.organisation, &repo.name),
            repo.organisation,
            branch
        );
        self.get_json(&url).await
    }
}

#[async_trait]
impl PullRequestProvider for GitHubProvider {
    async fn get_repository(
        &self,
        organisation: &str,
        name: &str,
    ) -> ProviderResult<RepositoryHandle> {
        let url = repo_url(&self.config.api_url, organisation, name);
        let repo: GhRepository = self.get_json(&url).await?;
        debug!(repository = %repo.html_url, "fetched repository");
        Ok(RepositoryHandle {
            organisation: repo.owner.login,
            name: repo.name,
            clone_url: repo.clone_url,
            default_branch: repo.default_branch,
            html_url: repo.html_url,
        })
    }

    async fn push_and_create_pull_request(
        &self,
        dir: &Path,
        repo: &RepositoryHandle,
        base: &str,
        details: &PullRequestDetails,
        filter: &PullRequestFilter,
    ) -> ProviderResult<PullRequestInfo> {
        if self.config.token.is_none() {
            return Err(ProviderError::NotConfigured(
                "set GIT_TOKEN or GITHUB_TOKEN to raise pull requests".to_string(),
            ));
        }

        self.git
            .push(dir, &details.branch_name, true)
            .await
            .map_err(|source| ProviderError::Push {
                branch: details.branch_name.clone(),
                source,
            })?;

        let existing = self.open_pulls_for(repo, &details.branch_name).await?;
        let pulls = pulls_url(&self.config.api_url, &repo.organisation, &repo.name);
        let info = match select_existing(&existing, &details.branch_name) {
            Some(pr) => {
                let body = PullBody {
                    title: &details.title,
                    body: &details.message,
                    head: None,
                    base: None,
                };
                let url = format!("{pulls}/{}", pr.number);
                let _: serde_json::Value = self.send_json(Method::PATCH, &url, &body).await?;
                PullRequestInfo {
                    number: pr.number,
                    url: pr.html_url.clone(),
                    reused: true,
                }
            }
            None => {
                let body = PullBody {
                    title: &details.title,
                    body: &details.message,
                    head: Some(&details.branch_name),
                    base: Some(base),
                };
                let created: GhPull = self.send_json(Method::POST, &pulls, &body).await?;
                PullRequestInfo {
                    number: created.number,
                    url: created.html_url,
                    reused: false,
                }
            }
        };

        if !filter.labels.is_empty() {
            let url = labels_url(&self.config.api_url, &repo.organisation, &repo.name, info.number);
            let body = LabelsBody {
                labels: &filter.labels,
            };
            let _: serde_json::Value = self.send_json(Method::POST, &url, &body).await?;
        }

        info!(url = %info.url, reused = info.reused, "pull request ready");
        Ok(info)
    }
}

fn repo_url(api: &str, organisation: &str, name: &str) -> String {
    format!("{}/repos/{organisation}/{name}", api.trim_end_matches('/'))
}

fn pulls_url(api: &str, organisation: &str, name: &str) -> String {
    format!("{}/pulls", repo_url(api, organisation, name))
}

fn labels_url(api: &str, organisation: &str, name: &str, number: u64) -> String {
    format!("{}/issues/{number}/labels", repo_url(api, organisation, name))
}

fn select_existing<'a>(pulls: &'a [GhPull], branch: &str) -> Option<&'a GhPull> {
    pulls.iter().find(|p| p.head.git_ref == branch)
}

/// GitHub error bodies carry a `message`; fall back to the raw text.
fn api_message(body: &str) -> String {
    serde_json::from_str::<GhError>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let api = "https://api.github.com/";
        assert_eq!(
            repo_url(api, "acme", "environment-dev"),
            "https://api.github.com/repos/acme/environment-dev"
        );
        assert_eq!(
            pulls_url(api, "acme", "environment-dev"),
            "https://api.github.com/repos/acme/environment-dev/pulls"
        );
        assert_eq!(
            labels_url(api, "acme", "environment-dev", 7),
            "https://api.github.com/repos/acme/environment-dev/issues/7/labels"
        );
    }

    #[test]
    fn test_select_existing_matches_head_branch() {
        let pulls: Vec<GhPull> = serde_json::from_str(
            r#"[
                {"number": 3, "html_url": "https://github.com/acme/env/pull/3", "head": {"ref": "other"}},
                {"number": 5, "html_url": "https://github.com/acme/env/pull/5", "head": {"ref": "boot-config-upgrade"}}
            ]"#,
        )
        .unwrap();
        assert_eq!(select_existing(&pulls, DEFAULT_PR_BRANCH).unwrap().number, 5);
        assert!(select_existing(&pulls, "missing").is_none());
    }

    #[test]
    fn test_api_message_prefers_json_message() {
        assert_eq!(
            api_message(r#"{"message": "Validation Failed", "errors": []}"#),
            "Validation Failed"
        );
        assert_eq!(api_message("  bad gateway \n"), "bad gateway");
    }

    #[test]
    fn test_new_pull_body_shape() {
        let body = PullBody {
            title: PR_TITLE,
            body: PR_MESSAGE,
            head: Some(DEFAULT_PR_BRANCH),
            base: Some("master"),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["title"], "feat(config): upgrade configuration");
        assert_eq!(json["head"], "boot-config-upgrade");

        let update = PullBody {
            title: PR_TITLE,
            body: PR_MESSAGE,
            head: None,
            base: None,
        };
        let json = serde_json::to_value(&update).unwrap();
        assert!(json.get("head").is_none());
    }

    #[test]
    fn test_defaults() {
        let details = PullRequestDetails::default();
        assert_eq!(details.branch_name, "boot-config-upgrade");
        assert_eq!(details.message, "Upgrade configuration");
        assert_eq!(PullRequestFilter::default().labels, vec!["boot-upgrade"]);
    }

    #[test]
    fn test_config_builder() {
        let config = ProviderConfig::new("https://ghe.example.com/api/v3/").with_token("t0k");
        assert_eq!(config.api_url, "https://ghe.example.com/api/v3");
        assert_eq!(config.token.as_deref(), Some("t0k"));
    }

    #[test]
    fn test_api_url_normalization_is_shared() {
        assert_eq!(
            normalize_api_url(" https://ghe.example.com/api/v3// "),
            "https://ghe.example.com/api/v3"
        );
        assert!(!ProviderConfig::from_env().api_url.ends_with('/'));
    }

    #[tokio::test]
    async fn test_missing_token_is_not_configured() {
        let git = Arc::new(git_plumbing::fakes::FakeGit::new());
        let provider =
            GitHubProvider::new(ProviderConfig::new("http://127.0.0.1:9"), git.clone()).unwrap();
        let repo = RepositoryHandle {
            organisation: "acme".to_string(),
            name: "environment-dev".to_string(),
            clone_url: "https://github.com/acme/environment-dev.git".to_string(),
            default_branch: "master".to_string(),
            html_url: "https://github.com/acme/environment-dev".to_string(),
        };
        let dir = tempfile::tempdir().unwrap();
        let err = provider
            .push_and_create_pull_request(
                dir.path(),
                &repo,
                "master",
                &PullRequestDetails::default(),
                &PullRequestFilter::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
        assert!(git.calls().is_empty());
    }
}
