//! In-memory fakes for the upgrade collaborators (testing only)
//!
//! Pair these with [`git_plumbing::fakes::FakeGit`] to drive the
//! orchestrator without a network or real repositories.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, UpgradeError};
use crate::model::VersionStreamRef;
use crate::provider::{
    ProviderError, ProviderResult, PullRequestDetails, PullRequestFilter, PullRequestInfo,
    PullRequestProvider, RepositoryHandle,
};
use crate::versions::ComponentVersionResolver;

/// Component versions keyed by version stream ref.
#[derive(Debug, Default)]
pub struct StaticVersions {
    versions: HashMap<String, String>,
}

impl StaticVersions {
    pub fn new() -> Self {
        Self::default()
    }

    /// At stream ref `stream_ref`, every component is at `version`.
    pub fn with_version(mut self, stream_ref: &str, version: &str) -> Self {
        self.versions
            .insert(stream_ref.to_string(), version.to_string());
        self
    }
}

#[async_trait]
impl ComponentVersionResolver for StaticVersions {
    async fn resolve_git_component_version(
        &self,
        stream: &VersionStreamRef,
        component_url: &str,
    ) -> Result<String> {
        self.versions
            .get(&stream.git_ref)
            .cloned()
            .ok_or_else(|| UpgradeError::Resolution {
                url: stream.url.clone(),
                reference: stream.git_ref.clone(),
                reason: format!("no version of {component_url} recorded"),
            })
    }
}

/// A pull request the fake provider was asked to raise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaisedPullRequest {
    pub repository: String,
    pub base: String,
    pub details: PullRequestDetails,
    pub labels: Vec<String>,
}

/// [`PullRequestProvider`] that records requests instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingProvider {
    raised: Mutex<Vec<RaisedPullRequest>>,
    failure: Option<String>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every pull request with `message`.
    pub fn failing(message: &str) -> Self {
        RecordingProvider {
            raised: Mutex::new(Vec::new()),
            failure: Some(message.to_string()),
        }
    }

    pub fn raised(&self) -> Vec<RaisedPullRequest> {
        self.raised.lock().unwrap().clone()
    }
}

#[async_trait]
impl PullRequestProvider for RecordingProvider {
    async fn get_repository(
        &self,
        organisation: &str,
        name: &str,
    ) -> ProviderResult<RepositoryHandle> {
        Ok(RepositoryHandle {
            organisation: organisation.to_string(),
            name: name.to_string(),
            clone_url: format!("https://github.com/{organisation}/{name}.git"),
            default_branch: "master".to_string(),
            html_url: format!("https://github.com/{organisation}/{name}"),
        })
    }

    async fn push_and_create_pull_request(
        &self,
        _dir: &Path,
        repo: &RepositoryHandle,
        base: &str,
        details: &PullRequestDetails,
        filter: &PullRequestFilter,
    ) -> ProviderResult<PullRequestInfo> {
        if let Some(message) = &self.failure {
            return Err(ProviderError::Api {
                method: "POST".to_string(),
                url: repo.html_url.clone(),
                status: 422,
                message: message.clone(),
            });
        }
        let mut raised = self.raised.lock().unwrap();
        raised.push(RaisedPullRequest {
            repository: format!("{}/{}", repo.organisation, repo.name),
            base: base.to_string(),
            details: details.clone(),
            labels: filter.labels.clone(),
        });
        let number = raised.len() as u64;
        Ok(PullRequestInfo {
            number,
            url: format!("{}/pull/{number}", repo.html_url),
            reused: false,
        })
    }
}
