//! Builder compatibility matrix
//!
//! Classifies a requested builder name and version against the known
//! compatibility matrix. A deprecated classification warns but does not stop
//! the pipeline; an unsupported builder is a hard failure before any external
//! process runs.

use super::BuilderRef;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Matrix shipped with the binary
const EMBEDDED_MATRIX: &str = include_str!("builder_matrix.yml");

#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("builder {0} is not supported")]
    Unsupported(BuilderRef),

    #[error("failed to read builder matrix: {0}")]
    Io(#[from] std::io::Error),

    #[error("builder matrix is not valid: {0}")]
    Invalid(#[from] serde_yaml::Error),
}

/// Compatibility classification for a builder that exists in the matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderSupport {
    Supported,
    Deprecated,
}

#[derive(Debug, Clone, Deserialize)]
struct VersionEntry {
    version: String,
    deprecated: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct BuilderEntry {
    name: String,
    #[serde(default)]
    deprecated: bool,
    versions: Vec<VersionEntry>,
}

/// Known builders and their version support flags
#[derive(Debug, Clone, Deserialize)]
pub struct BuilderMatrix {
    builders: Vec<BuilderEntry>,
}

impl BuilderMatrix {
    /// Loads the matrix embedded in the binary
    pub fn embedded() -> Result<Self, BuilderError> {
        Ok(serde_yaml::from_str(EMBEDDED_MATRIX)?)
    }

    pub fn load(path: &Path) -> Result<Self, BuilderError> {
        Ok(serde_yaml::from_str(&fs::read_to_string(path)?)?)
    }

    /// Classifies a requested builder
    ///
    /// The name must exist in the matrix and the version must exist under that
    /// name. Deprecation is the OR of the builder-level and version-level
    /// flags; an unset version flag inherits the builder's.
    pub fn validate(&self, requested: &BuilderRef) -> Result<BuilderSupport, BuilderError> {
        let builder = self
            .builders
            .iter()
            .find(|builder| builder.name == requested.name)
            .ok_or_else(|| BuilderError::Unsupported(requested.clone()))?;

        let version = builder
            .versions
            .iter()
            .find(|version| version.version == requested.version)
            .ok_or_else(|| BuilderError::Unsupported(requested.clone()))?;

        let deprecated = builder.deprecated || version.deprecated.unwrap_or(builder.deprecated);

        if deprecated {
            Ok(BuilderSupport::Deprecated)
        } else {
            Ok(BuilderSupport::Supported)
        }
    }
}
