//! Codebase build configuration
//!
//! Loads the `.copilot/config.yml` build settings and resolves the target
//! repository under a strict precedence hierarchy: an environment override
//! wins outright, then the config-file value; a public-registry path is used
//! verbatim, anything else is qualified with the account and region parsed
//! from the CI build ARN.

pub mod builder;

use crate::env::EnvSource;
use crate::util::arn::{Arn, ArnError};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Public registry namespace, used verbatim when targeted
pub const PUBLIC_REGISTRY: &str = "public.ecr.aws";

/// Environment override for the primary repository
pub const ECR_REPOSITORY_VAR: &str = "ECR_REPOSITORY";

/// Environment override for the additional repository
pub const ADDITIONAL_ECR_REPOSITORY_VAR: &str = "ADDITIONAL_ECR_REPOSITORY";

/// CI build ARN supplying the private registry account and region
pub const BUILD_ARN_VAR: &str = "CODEBUILD_BUILD_ARN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file {0} does not exist")]
    Missing(PathBuf),

    #[error("configuration file is not valid: {0}")]
    Invalid(#[from] serde_yaml::Error),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("no repository configured: set {ECR_REPOSITORY_VAR} or the repository key")]
    MissingRepository,

    #[error("cannot resolve a private repository without {BUILD_ARN_VAR}")]
    MissingBuildArn,

    #[error(transparent)]
    Arn(#[from] ArnError),
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    builder: RawBuilder,
    repository: Option<String>,
    additional_repository: Option<String>,
    #[serde(default)]
    packs: Vec<String>,
    #[serde(default)]
    packages: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawBuilder {
    name: String,
    version: String,
}

/// Requested builder name and version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderRef {
    pub name: String,
    pub version: String,
}

impl std::fmt::Display for BuilderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// Build settings declared by the codebase
#[derive(Debug, Clone)]
pub struct CodebaseConfig {
    pub builder: BuilderRef,
    pub repository_from_config: Option<String>,
    pub additional_repository_from_config: Option<String>,
    pub packs: Vec<String>,
    pub packages: Vec<String>,
}

impl CodebaseConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }

        let raw: RawConfig = serde_yaml::from_str(&fs::read_to_string(path)?)?;

        Ok(Self {
            builder: BuilderRef {
                name: raw.builder.name,
                version: raw.builder.version,
            },
            repository_from_config: raw.repository,
            additional_repository_from_config: raw.additional_repository,
            packs: raw.packs,
            packages: raw.packages,
        })
    }

    /// Resolves the fully qualified primary repository
    pub fn repository(&self, env: &dyn EnvSource) -> Result<String, ConfigError> {
        let chosen = env
            .get(ECR_REPOSITORY_VAR)
            .or_else(|| self.repository_from_config.clone())
            .ok_or(ConfigError::MissingRepository)?;

        qualify(&chosen, env)
    }

    /// Resolves the additional repository; absence is not an error
    pub fn additional_repository(&self, env: &dyn EnvSource) -> Result<Option<String>, ConfigError> {
        let chosen = env
            .get(ADDITIONAL_ECR_REPOSITORY_VAR)
            .or_else(|| self.additional_repository_from_config.clone());

        match chosen {
            Some(value) => Ok(Some(qualify(&value, env)?)),
            None => Ok(None),
        }
    }

    /// Registry host of the resolved repository
    pub fn registry(&self, env: &dyn EnvSource) -> Result<String, ConfigError> {
        let repository = self.repository(env)?;
        Ok(repository
            .split('/')
            .next()
            .unwrap_or(&repository)
            .to_string())
    }
}

fn qualify(value: &str, env: &dyn EnvSource) -> Result<String, ConfigError> {
    if value.starts_with(PUBLIC_REGISTRY) {
        return Ok(value.to_string());
    }

    let build_arn = env.get(BUILD_ARN_VAR).ok_or(ConfigError::MissingBuildArn)?;
    let arn = Arn::parse(&build_arn)?;

    Ok(format!(
        "{}.dkr.ecr.{}.amazonaws.com/{}",
        arn.account_id(),
        arn.region(),
        value
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnv;
    use tempfile::TempDir;

    const BUILD_ARN: &str = "arn:aws:codebuild:region:000000000000:build/project:example-build-id";

    fn config_with_repository(repository: Option<&str>) -> CodebaseConfig {
        CodebaseConfig {
            builder: BuilderRef {
                name: "paketobuildpacks/builder-jammy-full".to_string(),
                version: "0.3.288".to_string(),
            },
            repository_from_config: repository.map(str::to_string),
            additional_repository_from_config: None,
            packs: Vec::new(),
            packages: Vec::new(),
        }
    }

    #[test]
    fn test_loads_configuration_from_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(
            &path,
            "builder:\n  name: paketobuildpacks/builder-jammy-full\n  version: 0.3.288\n\
             repository: ecr/repos\npacks:\n  - paketo-buildpacks/nginx\npackages:\n  - graphviz\n",
        )
        .unwrap();

        let config = CodebaseConfig::load(&path).unwrap();

        assert_eq!(config.builder.name, "paketobuildpacks/builder-jammy-full");
        assert_eq!(config.builder.version, "0.3.288");
        assert_eq!(config.repository_from_config.as_deref(), Some("ecr/repos"));
        assert_eq!(config.packs, vec!["paketo-buildpacks/nginx"]);
        assert_eq!(config.packages, vec!["graphviz"]);
    }

    #[test]
    fn test_missing_configuration_file() {
        let err = CodebaseConfig::load(Path::new("/nonexistent/config.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_invalid_configuration_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "repository: ecr/repos\n").unwrap();

        let err = CodebaseConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_config_repository_is_qualified_with_arn() {
        let env = MapEnv::new().set(BUILD_ARN_VAR, BUILD_ARN);
        let config = config_with_repository(Some("ecr/repos"));

        assert_eq!(
            config.repository(&env).unwrap(),
            "000000000000.dkr.ecr.region.amazonaws.com/ecr/repos"
        );
    }

    #[test]
    fn test_environment_override_wins_over_config() {
        let env = MapEnv::new()
            .set(BUILD_ARN_VAR, BUILD_ARN)
            .set(ECR_REPOSITORY_VAR, "ecr/env-repo");
        let config = config_with_repository(Some("ecr/repos"));

        assert_eq!(
            config.repository(&env).unwrap(),
            "000000000000.dkr.ecr.region.amazonaws.com/ecr/env-repo"
        );
    }

    #[test]
    fn test_public_repository_is_returned_verbatim() {
        let config = config_with_repository(Some("public.ecr.aws/organisation/service"));

        assert_eq!(
            config.repository(&MapEnv::new()).unwrap(),
            "public.ecr.aws/organisation/service"
        );
    }

    #[test]
    fn test_no_repository_anywhere_fails() {
        let config = config_with_repository(None);
        let err = config.repository(&MapEnv::new()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRepository));
    }

    #[test]
    fn test_private_repository_without_arn_fails() {
        let config = config_with_repository(Some("ecr/repos"));
        let err = config.repository(&MapEnv::new()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingBuildArn));
    }

    #[test]
    fn test_registry_is_the_repository_host() {
        let env = MapEnv::new().set(BUILD_ARN_VAR, BUILD_ARN);
        let config = config_with_repository(Some("ecr/repos"));

        assert_eq!(
            config.registry(&env).unwrap(),
            "000000000000.dkr.ecr.region.amazonaws.com"
        );
    }

    #[test]
    fn test_additional_repository_absent_is_none() {
        let config = config_with_repository(Some("ecr/repos"));
        assert_eq!(config.additional_repository(&MapEnv::new()).unwrap(), None);
    }

    #[test]
    fn test_additional_repository_from_environment() {
        let env = MapEnv::new()
            .set(BUILD_ARN_VAR, BUILD_ARN)
            .set(ADDITIONAL_ECR_REPOSITORY_VAR, "ecr/repo2");
        let config = config_with_repository(Some("ecr/repos"));

        assert_eq!(
            config.additional_repository(&env).unwrap().as_deref(),
            Some("000000000000.dkr.ecr.region.amazonaws.com/ecr/repo2")
        );
    }

    #[test]
    fn test_additional_public_repository_is_verbatim() {
        let env = MapEnv::new().set(ADDITIONAL_ECR_REPOSITORY_VAR, "public.ecr.aws/my/repo");
        let config = config_with_repository(Some("public.ecr.aws/org/repo"));

        assert_eq!(
            config.additional_repository(&env).unwrap().as_deref(),
            Some("public.ecr.aws/my/repo")
        );
    }
}
