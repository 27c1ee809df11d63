//! Node.js detection (package.json)

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

/// Detects Node.js and resolves a major-only version
///
/// An `engines.node` constraint is resolved against the catalog within its
/// major line; without one the latest LTS wins. The result is always truncated
/// to the major component - the node buildpack resolves minors itself.
pub fn detect(path: &Path, catalog: &dyn VersionCatalog) -> Result<LanguageInfo, LanguageError> {
    let manifest = path.join("package.json");
    if !manifest.exists() {
        return Err(LanguageError::NotDetected("nodejs"));
    }

    let package: serde_json::Value = serde_json::from_str(&fs::read_to_string(&manifest)?)
        .map_err(|e| LanguageError::Manifest {
            file: "package.json",
            message: e.to_string(),
        })?;

    let hint = package
        .get("engines")
        .and_then(|engines| engines.get("node"))
        .and_then(|node| node.as_str())
        .and_then(|constraint| version_pattern().find(constraint))
        .map(|m| m.as_str().to_string());

    let version = match hint {
        Some(hint) => latest_version_for(catalog, "nodejs", false, Some(&hint))?,
        None => latest_version_for(catalog, "nodejs", true, None)?,
    };

    let major = version
        .split('.')
        .next()
        .unwrap_or(&version)
        .to_string();

    Ok(LanguageInfo {
        runtime: Runtime::NodeJs,
        version: major,
    })
}
