//! Ruby detection (Gemfile)

use super::end_of_life::{latest_version_for, VersionCatalog};
use super::{LanguageError, LanguageInfo, Runtime};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

fn ruby_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"ruby[^\d]+([\d]+\.[\d]+)").expect("ruby pattern is valid"))
}

/// Detects Ruby from the Gemfile's interpreter declaration
pub fn detect(path: &Path, catalog: &dyn VersionCatalog) -> Result<LanguageInfo, LanguageError> {
    let gemfile = path.join("Gemfile");
    if !gemfile.exists() {
        return Err(LanguageError::NotDetected("ruby"));
    }

    let contents = fs::read_to_string(&gemfile)?;
    let version = match ruby_pattern()
        .captures(&contents)
        .and_then(|captures| captures.get(1))
    {
        Some(version) => version.as_str().to_string(),
        None => latest_version_for(catalog, "ruby", false, None)?,
    };

    Ok(LanguageInfo {
        runtime: Runtime::Ruby,
        version,
    })
}

#[cfg(test)]
mod tests {
    use super::super::end_of_life::{Flag, ReleaseCycle, StaticCatalog};
    use super::*;
    use tempfile::TempDir;

    fn catalog() -> StaticCatalog {
        StaticCatalog::new().with_product(
            "ruby",
            vec![ReleaseCycle {
                cycle: "3.3".to_string(),
                lts: Flag::Bool(false),
                eol: Flag::Bool(false),
                latest: "3.3.0".to_string(),
            }],
        )
    }

    #[test]
    fn test_not_detected_without_gemfile() {
        let dir = TempDir::new().unwrap();
        let err = detect(dir.path(), &catalog()).unwrap_err();
        assert!(matches!(err, LanguageError::NotDetected("ruby")));
    }

    #[test]
    fn test_version_from_interpreter_declaration() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("Gemfile"),
            "source 'https://rubygems.org'\nruby '3.2.2'\n",
        )
        .unwrap();

        let info = detect(dir.path(), &catalog()).unwrap();
        assert_eq!(info.version, "3.2");
    }

    #[test]
    fn test_gemfile_without_declaration_falls_back_to_catalog() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Gemfile"), "source 'https://rubygems.org'\n").unwrap();

        let info = detect(dir.path(), &catalog()).unwrap();
        assert_eq!(info.version, "3.3");
    }
}
