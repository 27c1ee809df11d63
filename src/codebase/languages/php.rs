//! PHP detection (composer.json)

use super::end_of_life::{latest_version_for, VersionCatalog};
use super::{LanguageError, LanguageInfo, Runtime};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[0-9]+(\.[0-9]+)?").expect("version pattern is valid"))
}

/// Detects PHP and resolves the latest stable version for the constraint
pub fn detect(path: &Path, catalog: &dyn VersionCatalog) -> Result<LanguageInfo, LanguageError> {
    let manifest = path.join("composer.json");
    if !manifest.exists() {
        return Err(LanguageError::NotDetected("php"));
    }

    let composer: serde_json::Value = serde_json::from_str(&fs::read_to_string(&manifest)?)
        .map_err(|e| LanguageError::Manifest {
            file: "composer.json",
            message: e.to_string(),
        })?;

    let hint = composer
        .get("require")
        .and_then(|require| require.get("php"))
        .and_then(|php| php.as_str())
        .and_then(|constraint| version_pattern().find(constraint))
        .map(|m| m.as_str().to_string());

    let version = latest_version_for(catalog, "php", false, hint.as_deref())?;

    Ok(LanguageInfo {
        runtime: Runtime::Php,
        version,
    })
}

#[cfg(test)]
mod tests {
    use super::super::end_of_life::{Flag, ReleaseCycle, StaticCatalog};
    use super::*;
    use tempfile::TempDir;

    fn release(cycle: &str, latest: &str) -> ReleaseCycle {
        ReleaseCycle {
            cycle: cycle.to_string(),
            lts: Flag::Bool(false),
            eol: Flag::Bool(false),
            latest: latest.to_string(),
        }
    }

    fn catalog() -> StaticCatalog {
        StaticCatalog::new().with_product(
            "php",
            vec![release("8.3", "8.3.1"), release("8.2", "8.2.13")],
        )
    }

    #[test]
    fn test_not_detected_without_composer_json() {
        let dir = TempDir::new().unwrap();
        let err = detect(dir.path(), &catalog()).unwrap_err();
        assert!(matches!(err, LanguageError::NotDetected("php")));
    }

    #[test]
    fn test_require_constraint_resolves_matching_cycle() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("composer.json"),
            r#"{"require": {"php": "^8.2"}}"#,
        )
        .unwrap();

        let info = detect(dir.path(), &catalog()).unwrap();
        assert_eq!(info.version, "8.2");
    }

    #[test]
    fn test_no_constraint_takes_latest_stable() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("composer.json"), r#"{"name": "app"}"#).unwrap();

        let info = detect(dir.path(), &catalog()).unwrap();
        assert_eq!(info.version, "8.3");
    }
}
