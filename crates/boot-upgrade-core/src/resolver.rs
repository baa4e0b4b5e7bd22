//! Resolving symbolic references against a remote catalog repository.

use std::path::Path;
use std::sync::Arc;

use git_plumbing::GitService;
use tracing::debug;

use crate::error::{Result, UpgradeError};
use crate::model::ResolvedRevision;

/// Abbreviation used for labels of references given as raw commit ids.
const LABEL_SHA_LEN: usize = 12;

/// Turns tags, branches and commit ids into concrete commits.
///
/// Every call works in its own transient clone which is removed before the
/// call returns.
#[derive(Clone)]
pub struct ReferenceResolver {
    git: Arc<dyn GitService>,
}

impl ReferenceResolver {
    pub fn new(git: Arc<dyn GitService>) -> Self {
        Self { git }
    }

    pub async fn resolve(&self, catalog_url: &str, symbol: &str) -> Result<ResolvedRevision> {
        self.resolve_all(catalog_url, &[symbol])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| UpgradeError::Resolution {
                url: catalog_url.to_string(),
                reference: symbol.to_string(),
                reason: "no revision resolved".to_string(),
            })
    }

    /// Resolve several symbols against one clone of `catalog_url`, in order.
    pub async fn resolve_all(
        &self,
        catalog_url: &str,
        symbols: &[&str],
    ) -> Result<Vec<ResolvedRevision>> {
        let scratch = tempfile::Builder::new()
            .prefix("version-catalog-")
            .tempdir()?;
        let dir = scratch.path().join("catalog");
        self.git
            .clone_repo(catalog_url, &dir)
            .await
            .map_err(|e| UpgradeError::Resolution {
                url: catalog_url.to_string(),
                reference: symbols.join(", "),
                reason: format!("failed to clone: {e}"),
            })?;

        let mut out = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            out.push(resolve_in_clone(self.git.as_ref(), &dir, catalog_url, symbol).await?);
        }
        Ok(out)
    }
}

/// Resolve `symbol` inside an existing clone of `url`.
pub(crate) async fn resolve_in_clone(
    git: &dyn GitService,
    dir: &Path,
    url: &str,
    symbol: &str,
) -> Result<ResolvedRevision> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(UpgradeError::Resolution {
            url: url.to_string(),
            reference: String::new(),
            reason: "empty reference".to_string(),
        });
    }

    let remote_branch = format!("origin/{symbol}");
    let mut last_err = None;
    for candidate in [symbol, remote_branch.as_str()] {
        match git.get_commit_for_tag(dir, candidate).await {
            Ok(sha) => {
                debug!(url, reference = candidate, sha = %sha, "resolved reference");
                let label = version_label(symbol, &sha);
                return Ok(ResolvedRevision::new(sha, label));
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(UpgradeError::Resolution {
        url: url.to_string(),
        reference: symbol.to_string(),
        reason: last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "reference not found".to_string()),
    })
}

/// Symbols naming a tag or branch keep their name; raw commit ids are
/// abbreviated.
fn version_label(symbol: &str, sha: &str) -> String {
    let is_commit_id = symbol.len() >= 4
        && symbol.chars().all(|c| c.is_ascii_hexdigit())
        && sha.starts_with(&symbol.to_ascii_lowercase());
    if is_commit_id {
        sha[..LABEL_SHA_LEN.min(sha.len())].to_string()
    } else {
        symbol.to_string()
    }
}
