//! Repository URL helpers.

use crate::error::GitError;
use crate::model::RepositoryInfo;
use crate::Result;

/// Parse a clone URL into host, organisation and repository name.
///
/// Accepts `https://host/org/name(.git)`, URLs with embedded credentials,
/// `ssh://git@host/org/name.git` and the scp-like `git@host:org/name.git`.
/// Nested groups (`host/group/sub/name`) keep the full group path as the
/// organisation.
pub fn parse_repository_url(url: &str) -> Result<RepositoryInfo> {
    let trimmed = url.trim().trim_end_matches('/');

    let (host_part, path) = if let Some((_, rest)) = trimmed.split_once("://") {
        rest.split_once('/')
            .ok_or_else(|| GitError::Parse(format!("no repository path in URL {url}")))?
    } else if let Some((host, path)) = trimmed.split_once(':') {
        (host, path)
    } else {
        return Err(GitError::Parse(format!("unrecognised repository URL {url}")));
    };

    let host = host_part
        .rsplit_once('@')
        .map(|(_, h)| h)
        .unwrap_or(host_part);
    let path = path.trim_end_matches(".git");

    let (organisation, name) = path
        .rsplit_once('/')
        .ok_or_else(|| GitError::Parse(format!("no organisation in repository URL {url}")))?;

    if host.is_empty() || organisation.is_empty() || name.is_empty() {
        return Err(GitError::Parse(format!("incomplete repository URL {url}")));
    }

    Ok(RepositoryInfo {
        host: host.to_string(),
        organisation: organisation.to_string(),
        name: name.to_string(),
    })
}
