//! Deciding whether the version stream has moved past the pinned reference.

use tracing::info;

use crate::error::{Result, UpgradeError};
use crate::model::VersionStreamRef;
use crate::resolver::ReferenceResolver;

pub struct UpgradeAvailabilityChecker {
    resolver: ReferenceResolver,
}

impl UpgradeAvailabilityChecker {
    pub fn new(resolver: ReferenceResolver) -> Self {
        Self { resolver }
    }

    /// The candidate's commit id when it differs from the pinned reference.
    ///
    /// Both references are resolved to commits and compared; the symbol
    /// strings themselves are never compared.
    pub async fn check(
        &self,
        current: &VersionStreamRef,
        candidate_symbol: &str,
    ) -> Result<Option<String>> {
        let resolved = self
            .resolver
            .resolve_all(&current.url, &[current.git_ref.as_str(), candidate_symbol])
            .await?;
        let [pinned, candidate] = resolved.as_slice() else {
            return Err(UpgradeError::Resolution {
                url: current.url.clone(),
                reference: candidate_symbol.to_string(),
                reason: "expected two resolved revisions".to_string(),
            });
        };

        if pinned.same_state(candidate) {
            info!(
                pinned = %current.git_ref,
                candidate = candidate_symbol,
                commit = %pinned.commit_id,
                "No upgrade available"
            );
            return Ok(None);
        }
        info!(
            from = %pinned.version_label,
            to = %candidate.version_label,
            commit = %candidate.commit_id,
            "version stream upgrade available"
        );
        Ok(Some(candidate.commit_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git_plumbing::fakes::{FakeGit, FakeRemote};
    use std::sync::Arc;

    const STREAM: &str = "https://github.com/jenkins-x/jenkins-x-versions.git";

    fn checker(remote: FakeRemote) -> UpgradeAvailabilityChecker {
        let git = Arc::new(FakeGit::new().with_remote(STREAM, remote));
        UpgradeAvailabilityChecker::new(ReferenceResolver::new(git))
    }

    #[tokio::test]
    async fn test_same_commit_under_different_symbols_is_no_upgrade() {
        let checker = checker(
            FakeRemote::new()
                .with_ref("master", "s0s0s0s0s0s0s0")
                .with_ref("2367726d02b8c", "s0s0s0s0s0s0s0"),
        );
        let current = VersionStreamRef::new(STREAM, "2367726d02b8c");
        assert_eq!(checker.check(&current, "master").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_newer_candidate_returns_its_commit() {
        let checker = checker(
            FakeRemote::new()
                .with_ref("master", "s1s1s1s1s1s1s1")
                .with_ref("v1.0.0", "s0s0s0s0s0s0s0"),
        );
        let current = VersionStreamRef::new(STREAM, "v1.0.0");
        assert_eq!(
            checker.check(&current, "master").await.unwrap().as_deref(),
            Some("s1s1s1s1s1s1s1")
        );
    }

    #[tokio::test]
    async fn test_unresolvable_pinned_ref_is_error() {
        let checker = checker(FakeRemote::new().with_ref("master", "s1"));
        let current = VersionStreamRef::new(STREAM, "gone");
        assert!(checker.check(&current, "master").await.is_err());
    }
}
