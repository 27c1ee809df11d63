//! Runtime language detection
//!
//! Each supported runtime is detected independently from its manifest files;
//! a runtime that is not present is simply omitted from the result, while
//! manifest read or catalog failures propagate.

pub mod end_of_life;
pub mod nodejs;
pub mod php;
pub mod python;
pub mod ruby;

use end_of_life::{is_end_of_life, EndOfLifeError, VersionCatalog};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Supported runtimes, in detection order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Runtime {
    Python,
    NodeJs,
    Ruby,
    Php,
}

impl Runtime {
    pub const ALL: [Runtime; 4] = [Runtime::Python, Runtime::NodeJs, Runtime::Ruby, Runtime::Php];

    /// Product name as published in the version catalog
    pub fn name(&self) -> &'static str {
        match self {
            Runtime::Python => "python",
            Runtime::NodeJs => "nodejs",
            Runtime::Ruby => "ruby",
            Runtime::Php => "php",
        }
    }

    /// Buildpack auto-appended when the runtime is detected
    pub fn buildpack(&self) -> &'static str {
        match self {
            Runtime::Python => "paketo-buildpacks/python",
            Runtime::NodeJs => "paketo-buildpacks/nodejs",
            Runtime::Ruby => "paketo-buildpacks/ruby",
            Runtime::Php => "paketo-buildpacks/php",
        }
    }

    /// Buildpack environment variable carrying the resolved version
    pub fn version_variable(&self) -> &'static str {
        match self {
            Runtime::Python => "BP_CPYTHON_VERSION",
            Runtime::NodeJs => "BP_NODE_VERSION",
            Runtime::Ruby => "BP_MRI_VERSION",
            Runtime::Php => "BP_PHP_VERSION",
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum LanguageError {
    #[error("no {0} manifest detected")]
    NotDetected(&'static str),

    #[error("failed to read manifest: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse {file}: {message}")]
    Manifest { file: &'static str, message: String },

    #[error("version catalog lookup failed: {0}")]
    Catalog(#[from] EndOfLifeError),
}

/// A detected runtime with its resolved version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageInfo {
    pub runtime: Runtime,
    pub version: String,
}

impl LanguageInfo {
    /// Lazily computed end-of-life status for the resolved version
    pub fn end_of_life(&self, catalog: &dyn VersionCatalog) -> Result<bool, EndOfLifeError> {
        is_end_of_life(catalog, self.runtime.name(), &self.version)
    }
}

impl fmt::Display for LanguageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.runtime, self.version)
    }
}

/// Detected languages keyed by runtime, iterated in detection order
#[derive(Debug, Default, Clone)]
pub struct Languages {
    detected: BTreeMap<Runtime, LanguageInfo>,
}

impl Languages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, info: LanguageInfo) {
        self.detected.insert(info.runtime, info);
    }

    pub fn get(&self, runtime: Runtime) -> Option<&LanguageInfo> {
        self.detected.get(&runtime)
    }

    pub fn contains(&self, runtime: Runtime) -> bool {
        self.detected.contains_key(&runtime)
    }

    pub fn is_empty(&self) -> bool {
        self.detected.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LanguageInfo> {
        self.detected.values()
    }
}

impl fmt::Display for Languages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list: Vec<String> = self.detected.values().map(|l| l.to_string()).collect();
        write!(f, "{}", list.join(", "))
    }
}

/// Detects all supported runtimes in the codebase
///
/// A per-runtime `NotDetected` omits that runtime; any other failure aborts
/// detection.
pub fn load_languages(
    path: &Path,
    catalog: &dyn VersionCatalog,
) -> Result<Languages, LanguageError> {
    let mut languages = Languages::new();

    for runtime in Runtime::ALL {
        let detected = match runtime {
            Runtime::Python => python::detect(path, catalog),
            Runtime::NodeJs => nodejs::detect(path, catalog),
            Runtime::Ruby => ruby::detect(path, catalog),
            Runtime::Php => php::detect(path, catalog),
        };

        match detected {
            Ok(info) => languages.insert(info),
            Err(LanguageError::NotDetected(_)) => continue,
            Err(other) => return Err(other),
        }
    }

    Ok(languages)
}
