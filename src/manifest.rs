//! Project manifest

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::EngineError;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Identity of the project under test
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Language of the step implementations
    pub language: String,
    #[serde(default)]
    pub plugins: Vec<String>,
}

impl Manifest {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            plugins: Vec::new(),
        }
    }

    /// Load `manifest.json` from the project root
    pub fn load(project_root: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = project_root.as_ref().join(MANIFEST_FILE);
        let fail = |reason: String| EngineError::Manifest {
            path: path.clone(),
            reason,
        };

        let content = std::fs::read_to_string(&path).map_err(|e| fail(e.to_string()))?;
        let manifest: Manifest = serde_json::from_str(&content).map_err(|e| fail(e.to_string()))?;
        if manifest.language.trim().is_empty() {
            return Err(fail("language is not set".to_string()));
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_manifest() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"language": "python", "plugins": ["html-report"]}"#,
        )
        .unwrap();

        let manifest = Manifest::load(dir.path()).unwrap();
        assert_eq!(manifest.language, "python");
        assert_eq!(manifest.plugins, vec!["html-report"]);
    }

    #[test]
    fn test_missing_manifest_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = Manifest::load(dir.path()).unwrap_err();
        assert!(matches!(err, EngineError::Manifest { .. }));
    }

    #[test]
    fn test_corrupt_manifest_is_fatal() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "{ language: ").unwrap();
        assert!(Manifest::load(dir.path()).is_err());

        std::fs::write(dir.path().join(MANIFEST_FILE), r#"{"language": " "}"#).unwrap();
        assert!(Manifest::load(dir.path()).is_err());
    }
}
