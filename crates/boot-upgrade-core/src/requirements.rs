//! Requirements file persistence.
//!
//! The requirements file is owned by other tooling. Only
//! `versionStream.url` and `versionStream.ref` are read or written here;
//! the rest of the document is kept as an untyped YAML value so every other
//! field survives a load/save cycle.

use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::{Result, UpgradeError};
use crate::model::VersionStreamRef;

pub const REQUIREMENTS_FILE_NAME: &str = "jx-requirements.yml";

const VERSION_STREAM_KEY: &str = "versionStream";
const URL_KEY: &str = "url";
const REF_KEY: &str = "ref";

/// A loaded requirements document and where it came from.
#[derive(Debug, Clone)]
pub struct Requirements {
    path: PathBuf,
    doc: Value,
}

impl Requirements {
    /// Load the requirements file from `dir` or the nearest parent holding one.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = find_requirements_file(dir).ok_or_else(|| UpgradeError::Persistence {
            path: dir.join(REQUIREMENTS_FILE_NAME),
            reason: format!(
                "no requirements file {REQUIREMENTS_FILE_NAME} found; ensure you are running this command inside a GitOps clone"
            ),
        })?;
        let raw = std::fs::read_to_string(&path).map_err(|e| UpgradeError::Persistence {
            path: path.clone(),
            reason: format!("failed to read requirements file: {e}"),
        })?;
        let doc = if raw.trim().is_empty() {
            Value::Mapping(Mapping::new())
        } else {
            serde_yaml::from_str(&raw).map_err(|e| UpgradeError::Persistence {
                path: path.clone(),
                reason: format!("failed to parse requirements file: {e}"),
            })?
        };
        if !doc.is_mapping() {
            return Err(UpgradeError::Persistence {
                path,
                reason: "requirements file is not a YAML mapping".to_string(),
            });
        }
        debug!(path = %path.display(), "loaded requirements");
        Ok(Requirements { path, doc })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The pinned version stream. Missing fields come back empty.
    pub fn version_stream(&self) -> VersionStreamRef {
        let field = |key: &str| {
            self.doc
                .get(VERSION_STREAM_KEY)
                .and_then(|vs| vs.get(key))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        VersionStreamRef::new(field(URL_KEY), field(REF_KEY))
    }

    /// Set `versionStream.ref`. Returns whether the value changed.
    pub fn set_version_stream_ref(&mut self, git_ref: &str) -> bool {
        if self.version_stream().git_ref == git_ref {
            return false;
        }
        let Value::Mapping(root) = &mut self.doc else {
            return false;
        };
        let needs_section = !matches!(root.get(VERSION_STREAM_KEY), Some(Value::Mapping(_)));
        if needs_section {
            root.insert(
                Value::from(VERSION_STREAM_KEY),
                Value::Mapping(Mapping::new()),
            );
        }
        match root.get_mut(VERSION_STREAM_KEY) {
            Some(Value::Mapping(section)) => {
                section.insert(Value::from(REF_KEY), Value::from(git_ref));
                true
            }
            _ => false,
        }
    }

    pub fn save(&self) -> Result<()> {
        let out = serde_yaml::to_string(&self.doc).map_err(|e| UpgradeError::Persistence {
            path: self.path.clone(),
            reason: format!("failed to serialize requirements: {e}"),
        })?;
        std::fs::write(&self.path, out).map_err(|e| UpgradeError::Persistence {
            path: self.path.clone(),
            reason: format!("failed to write requirements file: {e}"),
        })?;
        debug!(path = %self.path.display(), "saved requirements");
        Ok(())
    }
}

fn find_requirements_file(dir: &Path) -> Option<PathBuf> {
    dir.ancestors()
        .map(|d| d.join(REQUIREMENTS_FILE_NAME))
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
cluster:
  clusterName: dev
  provider: gke
versionStream:
  ref: 2367726d02b8c
  url: https://github.com/jenkins-x/jenkins-x-versions.git
webhook: lighthouse
";

    fn write_sample(dir: &Path, content: &str) {
        std::fs::write(dir.join(REQUIREMENTS_FILE_NAME), content).unwrap();
    }

    #[test]
    fn test_load_reads_version_stream() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path(), SAMPLE);

        let req = Requirements::load(dir.path()).unwrap();
        let vs = req.version_stream();
        assert_eq!(vs.git_ref, "2367726d02b8c");
        assert_eq!(vs.url, "https://github.com/jenkins-x/jenkins-x-versions.git");
    }

    #[test]
    fn test_load_from_subdirectory_finds_parent_file() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path(), SAMPLE);
        let nested = dir.path().join("env").join("templates");
        std::fs::create_dir_all(&nested).unwrap();

        let req = Requirements::load(&nested).unwrap();
        assert_eq!(req.path(), dir.path().join(REQUIREMENTS_FILE_NAME));
    }

    #[test]
    fn test_missing_file_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Requirements::load(dir.path()).unwrap_err();
        assert!(matches!(err, UpgradeError::Persistence { .. }));
        assert!(err.to_string().contains("GitOps clone"));
    }

    #[test]
    fn test_set_ref_round_trips_other_fields() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path(), SAMPLE);

        let mut req = Requirements::load(dir.path()).unwrap();
        assert!(req.set_version_stream_ref("22222222"));
        assert!(!req.set_version_stream_ref("22222222"));
        req.save().unwrap();

        let reloaded = Requirements::load(dir.path()).unwrap();
        assert_eq!(reloaded.version_stream().git_ref, "22222222");
        assert_eq!(
            reloaded.version_stream().url,
            "https://github.com/jenkins-x/jenkins-x-versions.git"
        );
        let raw = std::fs::read_to_string(dir.path().join(REQUIREMENTS_FILE_NAME)).unwrap();
        assert!(raw.contains("clusterName: dev"));
        assert!(raw.contains("webhook: lighthouse"));
    }

    #[test]
    fn test_missing_version_stream_section_is_created() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path(), "cluster:\n  provider: kind\n");

        let mut req = Requirements::load(dir.path()).unwrap();
        assert!(!req.version_stream().is_complete());
        assert!(req.set_version_stream_ref("abc"));
        assert_eq!(req.version_stream().git_ref, "abc");
        assert_eq!(req.version_stream().url, "");
    }

    #[test]
    fn test_non_mapping_document_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path(), "- just\n- a list\n");
        assert!(Requirements::load(dir.path()).is_err());
    }
}
