//! Build command compiler
//!
//! Turns a resolved [`Codebase`] into the ordered, deterministic `pack build`
//! command: canonical buildpack ordering, derived environment variables and
//! one `--tag` per revision tag. Given identical inputs the compiled command
//! is byte-identical, which the fixtures rely on.

use crate::codebase::Codebase;
use crate::config::ConfigError;
use crate::env::EnvSource;
use crate::exec::{CommandRunner, ExecError};
use crate::publish::{publish_to_additional_repository, PublishError};
use thiserror::Error;
use tracing::info;

/// Image label carrying the build timestamp, read back at deploy time
pub const BUILD_TIMESTAMP_LABEL: &str = "dev.packforge.build.timestamp";

/// VCS metadata buildpack, always first
const GIT_BUILDPACK: &str = "paketo-buildpacks/git";
/// System package buildpack, included only when packages are declared
const APT_BUILDPACK: &str = "fagiani/apt";
/// Runtime launch buildpack
const RUN_BUILDPACK: &str = "fagiani/run";
/// Fixed metadata buildpacks, always last
const IMAGE_LABELS_BUILDPACK: &str = "gcr.io/paketo-buildpacks/image-labels";
const ENVIRONMENT_VARIABLES_BUILDPACK: &str = "gcr.io/paketo-buildpacks/environment-variables";

/// Sentinel substrings emitted by pack when a phase is entered
const BUILDING_MARKER: &str = "===> BUILDING";
const EXPORTING_MARKER: &str = "===> EXPORTING";

/// Upper bound on stderr carried into error messages and notifications
const STDERR_TAIL_CHARS: usize = 2500;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("pack build exited with status {exit_code}: {stderr_tail}")]
    BuildFailed { exit_code: i32, stderr_tail: String },

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Mid-build observation points surfaced from the pack output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildEvent {
    /// The builder entered its BUILDING phase
    Building,
    /// The builder entered its EXPORTING phase
    Exporting,
}

/// A compiled pack invocation for one codebase
pub struct Pack<'a> {
    codebase: &'a Codebase,
    repository: String,
    additional_repository: Option<String>,
    build_timestamp: Option<String>,
    run_image: Option<String>,
}

impl<'a> Pack<'a> {
    /// Resolves the target repositories and binds the build timestamp
    ///
    /// The timestamp ends up in the image labels and is how the deploy
    /// command later identifies this build; it is not the chat message
    /// reference.
    pub fn new(
        codebase: &'a Codebase,
        env: &dyn EnvSource,
        build_timestamp: Option<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            codebase,
            repository: codebase.config.repository(env)?,
            additional_repository: codebase.config.additional_repository(env)?,
            build_timestamp,
            run_image: None,
        })
    }

    pub fn with_run_image(mut self, run_image: Option<String>) -> Self {
        self.run_image = run_image;
        self
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Buildpacks in canonical order
    pub fn buildpacks(&self) -> Vec<String> {
        let mut buildpacks: Vec<String> = vec![GIT_BUILDPACK.to_string()];

        if !self.codebase.config.packages.is_empty() {
            buildpacks.push(APT_BUILDPACK.to_string());
        }

        for pack in &self.codebase.config.packs {
            if !buildpacks.contains(pack) {
                buildpacks.push(pack.clone());
            }
        }

        for language in self.codebase.languages.iter() {
            let buildpack = language.runtime.buildpack().to_string();
            if !buildpacks.contains(&buildpack) {
                buildpacks.push(buildpack);
            }
        }

        buildpacks.push(RUN_BUILDPACK.to_string());
        buildpacks.push(IMAGE_LABELS_BUILDPACK.to_string());
        buildpacks.push(ENVIRONMENT_VARIABLES_BUILDPACK.to_string());

        buildpacks
    }

    /// Environment variables in canonical order
    pub fn environment(&self) -> Vec<String> {
        let buildpacks = self.buildpacks();
        let revision = &self.codebase.revision;
        let mut environment = Vec::new();

        for language in self.codebase.languages.iter() {
            if buildpacks.contains(&language.runtime.buildpack().to_string()) {
                environment.push(format!(
                    "{}={}",
                    language.runtime.version_variable(),
                    language.version
                ));
            }
        }

        if let Some(tag) = &revision.tag {
            environment.push(format!("BPE_GIT_TAG={}", tag));
        }

        if let Some(commit) = &revision.commit {
            environment.push(format!("BPE_GIT_COMMIT={}", commit));
            environment.push(format!("BP_OCI_REVISION={}", commit));
            environment.push(format!("BP_OCI_VERSION={}", commit));
        }

        if let Some(branch) = &revision.branch {
            environment.push(format!("BPE_GIT_BRANCH={}", branch));
        }

        // tag wins over commit for the OCI reference name
        if let Some(tag) = &revision.tag {
            environment.push(format!("BP_OCI_REF_NAME=tag-{}", tag));
        } else if let Some(commit) = &revision.commit {
            environment.push(format!("BP_OCI_REF_NAME=commit-{}", commit));
        }

        if let Ok(url) = revision.repository_url() {
            environment.push(format!("BP_OCI_SOURCE={}", url));
        }

        if let Some(timestamp) = &self.build_timestamp {
            environment.push(format!(
                "BP_IMAGE_LABELS=\"{}={}\"",
                BUILD_TIMESTAMP_LABEL, timestamp
            ));
        }

        environment
    }

    /// Image tags for this build, in canonical order
    pub fn tags(&self) -> Vec<String> {
        self.codebase.revision.docker_tags()
    }

    /// The full pack command as a single deterministic string
    pub fn command(&self, publish: bool) -> String {
        let mut parts = vec![
            format!("pack build {}", self.repository),
            format!("--builder {}", self.codebase.config.builder),
        ];

        for tag in self.tags() {
            parts.push(format!("--tag {}:{}", self.repository, tag));
        }

        for variable in self.environment() {
            parts.push(format!("--env {}", variable));
        }

        for buildpack in self.buildpacks() {
            parts.push(format!("--buildpack {}", buildpack));
        }

        if publish {
            parts.push(format!("--publish --cache-image {}:cache", self.repository));
        }

        if let Some(run_image) = &self.run_image {
            parts.push(format!("--run-image {}", run_image));
        }

        parts.join(" ")
    }

    /// Runs the build, streaming output and surfacing phase markers
    ///
    /// Blocks until pack exits. On success with `publish` set and an
    /// additional repository configured, the built tags are mirrored there.
    pub fn build(
        &self,
        publish: bool,
        runner: &dyn CommandRunner,
        env: &dyn EnvSource,
        on_event: &mut dyn FnMut(BuildEvent),
    ) -> Result<(), PackError> {
        let command = self.command(publish);
        info!("running: {}", command);

        let output = runner.stream(&command, &mut |line| {
            println!("{}", line);
            if line.contains(BUILDING_MARKER) {
                on_event(BuildEvent::Building);
            }
            if line.contains(EXPORTING_MARKER) {
                on_event(BuildEvent::Exporting);
            }
        })?;

        if !output.success() {
            return Err(PackError::BuildFailed {
                exit_code: output.exit_code,
                stderr_tail: stderr_tail(&output.stderr),
            });
        }

        if publish {
            if let Some(additional) = &self.additional_repository {
                publish_to_additional_repository(
                    runner,
                    env,
                    &self.repository,
                    additional,
                    &self.tags(),
                )?;
            }
        }

        Ok(())
    }
}

/// Last [`STDERR_TAIL_CHARS`] characters of stderr, bounding message size
fn stderr_tail(stderr: &str) -> String {
    let total = stderr.chars().count();
    stderr
        .chars()
        .skip(total.saturating_sub(STDERR_TAIL_CHARS))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codebase::languages::{LanguageInfo, Languages, Runtime};
    use crate::codebase::processes::load_processes;
    use crate::codebase::revision::Revision;
    use crate::codebase::Codebase;
    use crate::config::builder::BuilderMatrix;
    use crate::config::{BuilderRef, CodebaseConfig, BUILD_ARN_VAR};
    use crate::env::MapEnv;
    use crate::exec::ScriptedRunner;
    use tempfile::TempDir;

    const BUILD_ARN: &str = "arn:aws:codebuild:region:000000000000:build/project:example-build-id";

    fn test_codebase(packs: Vec<&str>, packages: Vec<&str>) -> (TempDir, Codebase) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Procfile"), "web: django serve\n").unwrap();

        let mut languages = Languages::new();
        languages.insert(LanguageInfo {
            runtime: Runtime::Python,
            version: "3.11".to_string(),
        });
        languages.insert(LanguageInfo {
            runtime: Runtime::NodeJs,
            version: "20.7".to_string(),
        });

        let codebase = Codebase {
            path: dir.path().to_path_buf(),
            config: CodebaseConfig {
                builder: BuilderRef {
                    name: "paketobuildpacks/builder-jammy-full".to_string(),
                    version: "0.3.288".to_string(),
                },
                repository_from_config: Some("ecr/repos".to_string()),
                additional_repository_from_config: None,
                packs: packs.into_iter().map(str::to_string).collect(),
                packages: packages.into_iter().map(str::to_string).collect(),
            },
            matrix: BuilderMatrix::embedded().unwrap(),
            revision: Revision::new(
                Some("git@github.com:org/repo.git".to_string()),
                Some("shorthash".to_string()),
                Some("longhash".to_string()),
                Some("v2.4.6".to_string()),
                Some("feat/tests".to_string()),
            )
            .unwrap(),
            processes: load_processes(dir.path()).unwrap(),
            languages,
            restores: Vec::new(),
        };

        (dir, codebase)
    }

    fn env() -> MapEnv {
        MapEnv::new().set(BUILD_ARN_VAR, BUILD_ARN)
    }

    #[test]
    fn test_buildpack_ordering_without_config_packs() {
        let (_dir, codebase) = test_codebase(vec![], vec![]);
        let pack = Pack::new(&codebase, &env(), None).unwrap();

        assert_eq!(
            pack.buildpacks(),
            vec![
                "paketo-buildpacks/git",
                "paketo-buildpacks/python",
                "paketo-buildpacks/nodejs",
                "fagiani/run",
                "gcr.io/paketo-buildpacks/image-labels",
                "gcr.io/paketo-buildpacks/environment-variables",
            ]
        );
    }

    #[test]
    fn test_buildpack_ordering_with_config_packs() {
        let (_dir, codebase) = test_codebase(vec!["paketo-buildpacks/nginx"], vec![]);
        let pack = Pack::new(&codebase, &env(), None).unwrap();

        assert_eq!(
            pack.buildpacks(),
            vec![
                "paketo-buildpacks/git",
                "paketo-buildpacks/nginx",
                "paketo-buildpacks/python",
                "paketo-buildpacks/nodejs",
                "fagiani/run",
                "gcr.io/paketo-buildpacks/image-labels",
                "gcr.io/paketo-buildpacks/environment-variables",
            ]
        );
    }

    #[test]
    fn test_apt_buildpack_included_with_packages() {
        let (_dir, codebase) = test_codebase(vec![], vec!["graphviz"]);
        let pack = Pack::new(&codebase, &env(), None).unwrap();

        assert_eq!(
            pack.buildpacks(),
            vec![
                "paketo-buildpacks/git",
                "fagiani/apt",
                "paketo-buildpacks/python",
                "paketo-buildpacks/nodejs",
                "fagiani/run",
                "gcr.io/paketo-buildpacks/image-labels",
                "gcr.io/paketo-buildpacks/environment-variables",
            ]
        );
    }

    #[test]
    fn test_configured_language_pack_is_not_duplicated() {
        let (_dir, codebase) = test_codebase(vec!["paketo-buildpacks/python"], vec![]);
        let pack = Pack::new(&codebase, &env(), None).unwrap();

        let python_packs = pack
            .buildpacks()
            .iter()
            .filter(|p| *p == "paketo-buildpacks/python")
            .count();
        assert_eq!(python_packs, 1);
    }

    #[test]
    fn test_environment_ordering() {
        let (_dir, codebase) = test_codebase(vec![], vec![]);
        let pack = Pack::new(&codebase, &env(), Some("timestamp".to_string())).unwrap();

        assert_eq!(
            pack.environment(),
            vec![
                "BP_CPYTHON_VERSION=3.11",
                "BP_NODE_VERSION=20.7",
                "BPE_GIT_TAG=v2.4.6",
                "BPE_GIT_COMMIT=shorthash",
                "BP_OCI_REVISION=shorthash",
                "BP_OCI_VERSION=shorthash",
                "BPE_GIT_BRANCH=feat/tests",
                "BP_OCI_REF_NAME=tag-v2.4.6",
                "BP_OCI_SOURCE=https://github.com/org/repo",
                "BP_IMAGE_LABELS=\"dev.packforge.build.timestamp=timestamp\"",
            ]
        );
    }

    #[test]
    fn test_oci_ref_name_falls_back_to_commit() {
        let (_dir, mut codebase) = test_codebase(vec![], vec![]);
        codebase.revision = Revision::new(
            Some("git@github.com:org/repo.git".to_string()),
            Some("shorthash".to_string()),
            None,
            None,
            Some("feat/tests".to_string()),
        )
        .unwrap();
        let pack = Pack::new(&codebase, &env(), None).unwrap();

        assert!(pack
            .environment()
            .contains(&"BP_OCI_REF_NAME=commit-shorthash".to_string()));
    }

    #[test]
    fn test_command_is_deterministic() {
        let (_dir, codebase) = test_codebase(vec![], vec![]);
        let pack = Pack::new(&codebase, &env(), Some("timestamp".to_string())).unwrap();

        assert_eq!(pack.command(false), pack.command(false));
        assert_eq!(pack.command(true), pack.command(true));
    }

    #[test]
    fn test_publish_appends_cache_image() {
        let (_dir, codebase) = test_codebase(vec![], vec![]);
        let pack = Pack::new(&codebase, &env(), None).unwrap();

        let command = pack.command(true);
        assert!(command.ends_with(
            "--publish --cache-image 000000000000.dkr.ecr.region.amazonaws.com/ecr/repos:cache"
        ));
    }

    #[test]
    fn test_run_image_override_is_trailing() {
        let (_dir, codebase) = test_codebase(vec![], vec![]);
        let pack = Pack::new(&codebase, &env(), None)
            .unwrap()
            .with_run_image(Some("custom/run:latest".to_string()));

        assert!(pack.command(false).ends_with("--run-image custom/run:latest"));
    }

    #[test]
    fn test_build_fires_phase_events() {
        let (_dir, codebase) = test_codebase(vec![], vec![]);
        let pack = Pack::new(&codebase, &env(), None).unwrap();
        let runner = ScriptedRunner::new().with_stdout(
            &pack.command(false),
            "===> ANALYZING\n===> BUILDING\nbuild output\n===> EXPORTING\n",
        );

        let mut events = Vec::new();
        pack.build(false, &runner, &env(), &mut |event| events.push(event))
            .unwrap();

        assert_eq!(events, vec![BuildEvent::Building, BuildEvent::Exporting]);
    }

    #[test]
    fn test_build_failure_carries_stderr_tail() {
        let (_dir, codebase) = test_codebase(vec![], vec![]);
        let pack = Pack::new(&codebase, &env(), None).unwrap();
        let long_stderr = "x".repeat(3000);
        let runner =
            ScriptedRunner::new().with_failure(&pack.command(false), 1, &long_stderr);

        let err = pack
            .build(false, &runner, &env(), &mut |_| {})
            .unwrap_err();

        match err {
            PackError::BuildFailed {
                exit_code,
                stderr_tail,
            } => {
                assert_eq!(exit_code, 1);
                assert_eq!(stderr_tail.chars().count(), 2500);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_publish_mirrors_to_additional_repository() {
        let (_dir, mut codebase) = test_codebase(vec![], vec![]);
        codebase.config.additional_repository_from_config = Some("ecr/repo2".to_string());
        let pack = Pack::new(&codebase, &env(), None).unwrap();
        let runner = ScriptedRunner::new();

        pack.build(true, &runner, &env(), &mut |_| {}).unwrap();

        let executed = runner.executed();
        assert!(executed
            .iter()
            .any(|c| c.contains("docker pull 000000000000.dkr.ecr.region.amazonaws.com/ecr/repos:commit-shorthash")));
        assert!(executed.iter().any(
            |c| c.contains("docker push 000000000000.dkr.ecr.region.amazonaws.com/ecr/repo2:commit-shorthash")
        ));
    }

    #[test]
    fn test_no_publish_skips_additional_repository() {
        let (_dir, mut codebase) = test_codebase(vec![], vec![]);
        codebase.config.additional_repository_from_config = Some("ecr/repo2".to_string());
        let pack = Pack::new(&codebase, &env(), None).unwrap();
        let runner = ScriptedRunner::new();

        pack.build(false, &runner, &env(), &mut |_| {}).unwrap();

        assert!(!runner.executed().iter().any(|c| c.contains("docker pull")));
    }
}
