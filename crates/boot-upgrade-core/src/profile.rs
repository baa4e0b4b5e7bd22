//! Install profiles and their default version stream / boot configuration.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UpgradeError};
use crate::model::VersionStreamRef;

pub const DEFAULT_VERSIONS_URL: &str = "https://github.com/jenkins-x/jenkins-x-versions.git";
pub const DEFAULT_VERSIONS_REF: &str = "master";
pub const DEFAULT_BOOT_REPOSITORY: &str = "https://github.com/jenkins-x/jenkins-x-boot-config.git";

pub const CLOUDBEES_VERSIONS_URL: &str =
    "https://github.com/cloudbees/cloudbees-jenkins-x-versions.git";
pub const CLOUDBEES_BOOT_REPOSITORY: &str =
    "https://github.com/cloudbees/cloudbees-jenkins-x-boot-config.git";

/// Distribution the cluster was installed from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallProfile {
    #[default]
    Oss,
    CloudBees,
}

/// Defaults a profile supplies when the cluster does not pin its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDefaults {
    pub version_stream_url: &'static str,
    pub version_stream_ref: &'static str,
    pub boot_config_url: &'static str,
}

impl InstallProfile {
    pub const ALL: [InstallProfile; 2] = [InstallProfile::Oss, InstallProfile::CloudBees];

    pub fn defaults(self) -> StreamDefaults {
        match self {
            InstallProfile::Oss => StreamDefaults {
                version_stream_url: DEFAULT_VERSIONS_URL,
                version_stream_ref: DEFAULT_VERSIONS_REF,
                boot_config_url: DEFAULT_BOOT_REPOSITORY,
            },
            InstallProfile::CloudBees => StreamDefaults {
                version_stream_url: CLOUDBEES_VERSIONS_URL,
                version_stream_ref: DEFAULT_VERSIONS_REF,
                boot_config_url: CLOUDBEES_BOOT_REPOSITORY,
            },
        }
    }

    pub fn default_stream(self) -> VersionStreamRef {
        let d = self.defaults();
        VersionStreamRef::new(d.version_stream_url, d.version_stream_ref)
    }

    /// The profile whose default version stream lives at `url`.
    pub fn for_stream_url(url: &str) -> Option<InstallProfile> {
        let wanted = normalize_url(url);
        Self::ALL
            .into_iter()
            .find(|p| normalize_url(p.defaults().version_stream_url) == wanted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstallProfile::Oss => "oss",
            InstallProfile::CloudBees => "cloudbees",
        }
    }
}

impl std::fmt::Display for InstallProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallProfile {
    type Err = UpgradeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oss" | "jenkins-x" => Ok(InstallProfile::Oss),
            "cloudbees" => Ok(InstallProfile::CloudBees),
            other => Err(UpgradeError::Profile(format!(
                "unknown install profile '{other}' (expected one of: oss, cloudbees)"
            ))),
        }
    }
}

/// Boot configuration repository to upgrade from.
///
/// An explicit URL wins. Otherwise the profile owning `stream_url` supplies
/// its boot configuration repository.
pub fn determine_boot_config_url(explicit: Option<&str>, stream_url: &str) -> Result<String> {
    if let Some(url) = explicit.map(str::trim).filter(|u| !u.is_empty()) {
        return Ok(url.to_string());
    }
    InstallProfile::for_stream_url(stream_url)
        .map(|p| p.defaults().boot_config_url.to_string())
        .ok_or_else(|| {
            UpgradeError::Profile(format!(
                "unable to determine default boot config URL for version stream {stream_url}"
            ))
        })
}

fn normalize_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    trimmed
        .strip_suffix(".git")
        .unwrap_or(trimmed)
        .to_ascii_lowercase()
}
