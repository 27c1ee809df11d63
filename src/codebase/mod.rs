//! Codebase build context
//!
//! Aggregates everything resolved from the codebase once at startup - build
//! configuration, builder matrix, revision, processes and languages - and
//! owns the setup/teardown file juggling around the external build.

pub mod languages;
pub mod processes;
pub mod revision;

use crate::config::builder::{BuilderError, BuilderMatrix, BuilderSupport};
use crate::config::{CodebaseConfig, ConfigError};
use crate::env::EnvSource;
use crate::exec::CommandRunner;
use languages::end_of_life::VersionCatalog;
use languages::{LanguageError, Languages};
use processes::{ProcessError, Processes};
use revision::{Revision, RevisionError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Relative path of the build configuration file
pub const CONFIG_PATH: &str = ".copilot/config.yml";

/// Optional hook script run at the end of the image build
const BUILD_HOOK_PATH: &str = "./.copilot/image_build_run.sh";

#[derive(Debug, Error)]
pub enum CodebaseError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Builder(#[from] BuilderError),

    #[error(transparent)]
    Revision(#[from] RevisionError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Language(#[from] LanguageError),

    #[error("failed to prepare codebase files: {0}")]
    Io(#[from] io::Error),
}

/// Bookkeeping for files touched during setup
#[derive(Debug, Clone)]
pub(crate) enum Restore {
    /// Write back the original contents on teardown
    Rewrite(PathBuf, String),
    /// Remove the file on teardown
    Remove(PathBuf),
}

/// The resolved build context for one pipeline run
#[derive(Debug)]
pub struct Codebase {
    pub path: PathBuf,
    pub config: CodebaseConfig,
    pub matrix: BuilderMatrix,
    pub revision: Revision,
    pub processes: Processes,
    pub languages: Languages,
    pub(crate) restores: Vec<Restore>,
}

impl Codebase {
    /// Loads the full build context from a codebase directory
    pub fn load(
        path: &Path,
        runner: &dyn CommandRunner,
        env: &dyn EnvSource,
        catalog: &dyn VersionCatalog,
    ) -> Result<Self, CodebaseError> {
        let config = CodebaseConfig::load(&path.join(CONFIG_PATH))?;
        let matrix = BuilderMatrix::embedded()?;
        let revision = revision::load_revision(path, runner, env)?;
        let processes = processes::load_processes(path)?;
        let languages = languages::load_languages(path, catalog)?;

        Ok(Self {
            path: path.to_path_buf(),
            config,
            matrix,
            revision,
            processes,
            languages,
            restores: Vec::new(),
        })
    }

    /// Validates the builder and prepares the codebase for the build
    ///
    /// Rewrites the Procfile with the filtered process list, writes the
    /// buildpack run hook and the Aptfile listing declared system packages.
    /// Everything touched here is undone by [`Codebase::teardown`].
    pub fn setup(&mut self) -> Result<BuilderSupport, CodebaseError> {
        let support = self.matrix.validate(&self.config.builder)?;
        if support == BuilderSupport::Deprecated {
            warn!("builder {} is deprecated", self.config.builder);
        }

        let procfile = self.path.join("Procfile");
        let original = fs::read_to_string(&procfile)?;
        self.restores.push(Restore::Rewrite(procfile, original));
        self.processes.write()?;

        let run_script = self.path.join("buildpack-run.sh");
        fs::write(&run_script, Self::run_script_contents())?;
        set_executable(&run_script)?;
        self.restores.push(Restore::Remove(run_script));

        let aptfile = self.path.join("Aptfile");
        fs::write(&aptfile, self.config.packages.join("\n"))?;
        self.restores.push(Restore::Remove(aptfile));

        Ok(support)
    }

    /// Restores every file touched by setup, best effort
    pub fn teardown(&mut self) {
        for restore in self.restores.drain(..) {
            let result = match &restore {
                Restore::Rewrite(path, contents) => fs::write(path, contents),
                Restore::Remove(path) => fs::remove_file(path),
            };
            if let Err(e) = result {
                warn!("teardown failed for {:?}: {}", restore, e);
            }
        }
    }

    fn run_script_contents() -> String {
        [
            "#!/usr/bin/env bash",
            "export NODE_HOME=/layers/paketo-buildpacks_node-engine/node",
            "export PYTHONPATH=/layers/paketo-buildpacks_pip-install/packages/lib\
             /python$BP_CPYTHON_VERSION/site-packages",
            &format!("if [ -f \"{}\" ]; then", BUILD_HOOK_PATH),
            &format!("    bash {}", BUILD_HOOK_PATH),
            "fi",
        ]
        .join("\n")
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o777))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}
