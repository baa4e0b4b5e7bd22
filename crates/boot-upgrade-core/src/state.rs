//! States of an upgrade run and the transitions between them.
//!
//! `advance` is pure: the orchestrator performs the side effect owned by
//! the current state, reports what happened as a [`Transition`], and asks
//! `advance` for the next state.

use serde::{Deserialize, Serialize};

use crate::error::{Result, UpgradeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeState {
    Init,
    GitIdentityConfigured,
    Cloned,
    StreamUpgradeChecked,
    /// Terminal: the pinned stream already is the candidate
    NoUpgrade,
    BranchCreated,
    ConfigDeltaChecked,
    /// The boot configuration did not move between the two stream states
    NoConfigUpgrade,
    Replayed,
    Guarded,
    PinnedRefUpdated,
    PrRaised,
    /// Terminal: success
    BranchCleaned,
}

/// Outcome of the step performed in a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    IdentityConfigured,
    RepositoryReady,
    StreamChecked { upgrade_available: bool },
    BranchCreated,
    ConfigDeltaComputed { empty: bool },
    CommitsReplayed,
    ProtectedFilesRestored,
    PinnedRefUpdated,
    PullRequestRaised,
    BranchCleaned,
}

impl UpgradeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, UpgradeState::NoUpgrade | UpgradeState::BranchCleaned)
    }

    pub fn advance(self, transition: Transition) -> Result<UpgradeState> {
        use Transition as T;
        use UpgradeState as S;

        let next = match (self, transition) {
            (S::Init, T::IdentityConfigured) => S::GitIdentityConfigured,
            (S::GitIdentityConfigured, T::RepositoryReady) => S::Cloned,
            (S::Cloned, T::StreamChecked { .. }) => S::StreamUpgradeChecked,
            (
                S::StreamUpgradeChecked,
                T::StreamChecked {
                    upgrade_available: false,
                },
            ) => S::NoUpgrade,
            (S::StreamUpgradeChecked, T::BranchCreated) => S::BranchCreated,
            (S::BranchCreated, T::ConfigDeltaComputed { .. }) => S::ConfigDeltaChecked,
            (S::ConfigDeltaChecked, T::ConfigDeltaComputed { empty: true }) => S::NoConfigUpgrade,
            (S::ConfigDeltaChecked, T::CommitsReplayed) => S::Replayed,
            (S::Replayed, T::ProtectedFilesRestored) => S::Guarded,
            (S::NoConfigUpgrade | S::Guarded, T::PinnedRefUpdated) => S::PinnedRefUpdated,
            (S::PinnedRefUpdated, T::PullRequestRaised) => S::PrRaised,
            (S::PrRaised, T::BranchCleaned) => S::BranchCleaned,
            (state, transition) => {
                return Err(UpgradeError::InvalidTransition {
                    state: state.to_string(),
                    transition: format!("{transition:?}"),
                })
            }
        };
        Ok(next)
    }
}

impl std::fmt::Display for UpgradeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Transition as T;
    use UpgradeState as S;

    fn walk(start: S, transitions: &[T]) -> Vec<S> {
        let mut trail = vec![start];
        let mut state = start;
        for t in transitions {
            state = state.advance(*t).unwrap();
            trail.push(state);
        }
        trail
    }

    #[test]
    fn test_no_upgrade_path() {
        let trail = walk(
            S::Init,
            &[
                T::IdentityConfigured,
                T::RepositoryReady,
                T::StreamChecked {
                    upgrade_available: false,
                },
                T::StreamChecked {
                    upgrade_available: false,
                },
            ],
        );
        assert_eq!(trail.last(), Some(&S::NoUpgrade));
        assert!(S::NoUpgrade.is_terminal());
    }

    #[test]
    fn test_full_upgrade_path() {
        let trail = walk(
            S::Init,
            &[
                T::IdentityConfigured,
                T::RepositoryReady,
                T::StreamChecked {
                    upgrade_available: true,
                },
                T::BranchCreated,
                T::ConfigDeltaComputed { empty: false },
                T::CommitsReplayed,
                T::ProtectedFilesRestored,
                T::PinnedRefUpdated,
                T::PullRequestRaised,
                T::BranchCleaned,
            ],
        );
        assert_eq!(
            trail,
            vec![
                S::Init,
                S::GitIdentityConfigured,
                S::Cloned,
                S::StreamUpgradeChecked,
                S::BranchCreated,
                S::ConfigDeltaChecked,
                S::Replayed,
                S::Guarded,
                S::PinnedRefUpdated,
                S::PrRaised,
                S::BranchCleaned,
            ]
        );
    }

    #[test]
    fn test_empty_delta_skips_replay_and_guard() {
        let state = S::ConfigDeltaChecked
            .advance(T::ConfigDeltaComputed { empty: true })
            .unwrap();
        assert_eq!(state, S::NoConfigUpgrade);
        assert_eq!(
            state.advance(T::PinnedRefUpdated).unwrap(),
            S::PinnedRefUpdated
        );
        assert!(S::ConfigDeltaChecked
            .advance(T::ConfigDeltaComputed { empty: false })
            .is_err());
    }

    #[test]
    fn test_invalid_transitions_are_rejected() {
        assert!(matches!(
            S::Init.advance(T::PullRequestRaised),
            Err(UpgradeError::InvalidTransition { .. })
        ));
        assert!(S::NoUpgrade.advance(T::BranchCreated).is_err());
        assert!(S::BranchCleaned.advance(T::BranchCleaned).is_err());
        // an upgrade without a branch never reaches the delta
        assert!(S::StreamUpgradeChecked
            .advance(T::ConfigDeltaComputed { empty: false })
            .is_err());
    }
}
