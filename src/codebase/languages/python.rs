//! Python detection (requirements.txt, pyproject.toml, runtime.txt)

use super::end_of_life::{latest_version_for, VersionCatalog};
use super::{LanguageError, LanguageInfo, Runtime};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[0-9]+\.[0-9]+").expect("version pattern is valid"))
}

/// Detects Python and resolves a `major.minor` version
///
/// Version precedence: the poetry interpreter constraint in pyproject.toml,
/// then runtime.txt, then the latest non-LTS release from the catalog.
pub fn detect(path: &Path, catalog: &dyn VersionCatalog) -> Result<LanguageInfo, LanguageError> {
    let requirements = path.join("requirements.txt");
    let pyproject = path.join("pyproject.toml");
    let runtime_txt = path.join("runtime.txt");

    let runtime_mentions_python =
        runtime_txt.exists() && fs::read_to_string(&runtime_txt)?.contains("python");

    if !requirements.exists() && !pyproject.exists() && !runtime_mentions_python {
        return Err(LanguageError::NotDetected("python"));
    }

    let mut version = None;

    if pyproject.exists() {
        version = poetry_interpreter_version(&fs::read_to_string(&pyproject)?);
    }

    if version.is_none() && runtime_txt.exists() {
        version = version_pattern()
            .find(&fs::read_to_string(&runtime_txt)?)
            .map(|m| m.as_str().to_string());
    }

    let version = match version {
        Some(version) => version,
        None => latest_version_for(catalog, "python", false, None)?,
    };

    Ok(LanguageInfo {
        runtime: Runtime::Python,
        version,
    })
}

fn poetry_interpreter_version(pyproject: &str) -> Option<String> {
    let document: toml::Value = pyproject.parse().ok()?;
    let constraint = document
        .get("tool")?
        .get("poetry")?
        .get("dependencies")?
        .get("python")?
        .as_str()?;

    version_pattern()
        .find(constraint)
        .map(|m| m.as_str().to_string())
}
