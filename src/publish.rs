//! Mirroring built images to an additional repository
//!
//! Pulls every built tag back from the primary repository, logs into the
//! additional registry and pushes each tag there under the same name.

use crate::docker::{self, DockerError};
use crate::env::EnvSource;
use crate::exec::{CommandRunner, ExecError};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("`{command}` exited with status {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error(transparent)]
    Docker(#[from] DockerError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Mirrors `tags` from `repository` into `additional_repository`
pub fn publish_to_additional_repository(
    runner: &dyn CommandRunner,
    env: &dyn EnvSource,
    repository: &str,
    additional_repository: &str,
    tags: &[String],
) -> Result<(), PublishError> {
    for tag in tags {
        checked(runner, &format!("docker pull {}:{}", repository, tag))?;
    }

    let registry = additional_repository
        .split('/')
        .next()
        .unwrap_or(additional_repository);
    docker::login(runner, env, registry)?;

    for tag in tags {
        let source = format!("{}:{}", repository, tag);
        let target = format!("{}:{}", additional_repository, tag);
        checked(runner, &format!("docker tag {} {}", source, target))?;
        checked(runner, &format!("docker push {}", target))?;
    }

    Ok(())
}

fn checked(runner: &dyn CommandRunner, command: &str) -> Result<(), PublishError> {
    info!("running: {}", command);
    let output = runner.run(command)?;
    if !output.success() {
        return Err(PublishError::CommandFailed {
            command: command.to_string(),
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnv;
    use crate::exec::ScriptedRunner;

    const PRIMARY: &str = "000000000000.dkr.ecr.eu-west-2.amazonaws.com/ecr/repos";
    const ADDITIONAL: &str = "public.ecr.aws/org/repo";

    fn tags() -> Vec<String> {
        vec!["commit-shorthash".to_string(), "tag-latest".to_string()]
    }

    #[test]
    fn test_pulls_logs_in_tags_and_pushes_in_order() {
        let runner = ScriptedRunner::new();

        publish_to_additional_repository(&runner, &MapEnv::new(), PRIMARY, ADDITIONAL, &tags())
            .unwrap();

        let executed = runner.executed();
        assert_eq!(executed[0], format!("docker pull {}:commit-shorthash", PRIMARY));
        assert_eq!(executed[1], format!("docker pull {}:tag-latest", PRIMARY));
        assert!(executed[2].starts_with("aws ecr-public get-login-password"));
        assert_eq!(
            executed[3],
            format!("docker tag {p}:commit-shorthash {a}:commit-shorthash", p = PRIMARY, a = ADDITIONAL)
        );
        assert_eq!(executed[4], format!("docker push {}:commit-shorthash", ADDITIONAL));
        assert_eq!(
            executed[5],
            format!("docker tag {p}:tag-latest {a}:tag-latest", p = PRIMARY, a = ADDITIONAL)
        );
        assert_eq!(executed[6], format!("docker push {}:tag-latest", ADDITIONAL));
    }

    #[test]
    fn test_private_additional_registry_gets_regional_login() {
        let runner = ScriptedRunner::new();
        let additional = "111111111111.dkr.ecr.us-east-2.amazonaws.com/other/repo";

        publish_to_additional_repository(&runner, &MapEnv::new(), PRIMARY, additional, &tags())
            .unwrap();

        assert!(runner
            .executed()
            .iter()
            .any(|c| c.starts_with("aws ecr get-login-password --region us-east-2")));
    }

    #[test]
    fn test_failed_pull_aborts_before_login() {
        let runner = ScriptedRunner::new().with_failure(
            &format!("docker pull {}:commit-shorthash", PRIMARY),
            1,
            "manifest unknown",
        );

        let err = publish_to_additional_repository(
            &runner,
            &MapEnv::new(),
            PRIMARY,
            ADDITIONAL,
            &tags(),
        )
        .unwrap_err();

        assert!(matches!(err, PublishError::CommandFailed { exit_code: 1, .. }));
        assert_eq!(runner.executed().len(), 1);
    }

    #[test]
    fn test_failed_push_surfaces_stderr() {
        let runner = ScriptedRunner::new().with_failure(
            &format!("docker push {}:commit-shorthash", ADDITIONAL),
            1,
            "denied: not authorized\n",
        );

        let err = publish_to_additional_repository(
            &runner,
            &MapEnv::new(),
            PRIMARY,
            ADDITIONAL,
            &tags(),
        )
        .unwrap_err();

        assert!(err.to_string().contains("denied: not authorized"));
    }
}
