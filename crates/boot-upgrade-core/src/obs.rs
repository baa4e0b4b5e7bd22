//! Structured observability hooks for upgrade lifecycle events.
//!
//! Events are emitted at `info!` level (warn for skipped commits) with an
//! `event` field so log pipelines can filter on them. Use `--json` on the
//! binary for newline-delimited JSON.

use tracing::{info, warn};

/// RAII guard that enters a run-scoped span for the duration of an upgrade.
///
/// ```ignore
/// let _span = UpgradeSpan::enter("6f0c1c4e-...");
/// // every log line now carries run_id
/// ```
pub struct UpgradeSpan {
    _span: tracing::span::EnteredSpan,
}

impl UpgradeSpan {
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("boot_upgrade.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_upgrade_started(run_id: &str, dir: Option<&str>, upgrade_ref: &str) {
    info!(
        event = "upgrade.started",
        run_id = %run_id,
        dir = dir.unwrap_or("<dev environment clone>"),
        upgrade_ref = %upgrade_ref,
    );
}

pub fn emit_state_entered(run_id: &str, state: &str) {
    info!(event = "upgrade.state_entered", run_id = %run_id, state = %state);
}

/// A commit was cherry-picked onto the working branch.
pub fn emit_commit_replayed(sha: &str, subject: &str) {
    info!(event = "replay.commit_applied", sha = %sha, subject = %subject);
}

/// A commit was left out of the replay.
pub fn emit_commit_skipped(sha: &str, reason: &str) {
    warn!(event = "replay.commit_skipped", sha = %sha, reason = %reason);
}

pub fn emit_upgrade_finished(run_id: &str, final_state: &str, duration_ms: u64, success: bool) {
    info!(
        event = "upgrade.finished",
        run_id = %run_id,
        final_state = %final_state,
        duration_ms = duration_ms,
        success = success,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upgrade_span_create() {
        let _span = UpgradeSpan::enter("test-run-id");
        emit_state_entered("test-run-id", "Cloned");
    }
}
