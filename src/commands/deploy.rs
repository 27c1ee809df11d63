//! The `deploy` subcommand
//!
//! Deploys a previously built image: clones the deployment repository over the
//! CodeStar git-http endpoint, works out which image tag to deploy, reads the
//! build timestamp back out of the image labels to thread chat comments under
//! the original build message, and runs the deployment tool once per service.

use crate::cli::DeployArgs;
use crate::docker;
use crate::env::{EnvSource, SystemEnv};
use crate::exec::{CommandRunner, ShellRunner};
use crate::notify::Notify;
use crate::pack::BUILD_TIMESTAMP_LABEL;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use tracing::info;

pub const IMAGE_TAG_VAR: &str = "IMAGE_TAG";
pub const ECR_TAG_PATTERN_VAR: &str = "ECR_TAG_PATTERN";
pub const COPILOT_ENVIRONMENT_VAR: &str = "COPILOT_ENVIRONMENT";
pub const COPILOT_SERVICES_VAR: &str = "COPILOT_SERVICES";
pub const DEPLOY_REPOSITORY_VAR: &str = "DEPLOY_REPOSITORY";
pub const CODEBASE_REPOSITORY_VAR: &str = "CODEBASE_REPOSITORY";

const SOURCE_DIR_VAR: &str = "CODEBUILD_SRC_DIR";

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("cannot detect image tag: {0}")]
    CannotDetectImageTag(String),

    #[error("missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("failed to clone deploy repository: {0}")]
    CannotCloneRepository(String),

    #[error("image contains no build timestamp")]
    MissingTimestamp,

    #[error("deployment failed: {0}")]
    Failed(String),
}

pub fn run(args: &DeployArgs) -> anyhow::Result<()> {
    let env = SystemEnv;
    let notify = if args.send_notifications {
        Notify::new(&env)?
    } else {
        Notify::disabled()
    };

    execute(&ShellRunner, &env, notify)
}

/// Runs the deploy flow against explicit collaborators
pub fn execute(
    runner: &dyn CommandRunner,
    env: &dyn EnvSource,
    mut notify: Notify,
) -> anyhow::Result<()> {
    if !docker::running(runner)? {
        info!("docker is not running, starting up");
        docker::start(runner)?;
    }
    info!("docker is running, continuing with deployment");

    clone_deployment_repository(runner, env)?;

    let tag = image_tag_for_deployment(env)?;
    let repository = image_repository_url(env)?;
    let timestamp = deployment_reference(runner, &repository, &tag)?;
    notify.set_reference(timestamp);

    let environment = env.get(COPILOT_ENVIRONMENT_VAR).unwrap_or_default();
    let services: Vec<String> = env
        .get(COPILOT_SERVICES_VAR)
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let service_list = services.join(", ");

    notify.post_job_comment(
        &format!("Deploying {} to {}", service_list, environment),
        &comment_lines(
            &format!("Deploying {} to {}", service_list, environment),
            env,
            &tag,
            &notify,
        ),
        true,
    );

    let mut command = format!(
        "cd deploy && IMAGE_TAG={} copilot deploy --env {} --deploy-env=false --force",
        tag, environment
    );
    for service in &services {
        command.push_str(&format!(" --name {}/1", service));
    }

    info!("running: {}", command);
    let output = runner.run(&command)?;
    if !output.success() {
        return Err(DeployError::Failed(output.stderr.trim().to_string()).into());
    }

    notify.post_job_comment(
        &format!("Deployment of {} to {} complete", service_list, environment),
        &comment_lines(
            &format!("Deployment of {} to {} complete", service_list, environment),
            env,
            &tag,
            &notify,
        ),
        true,
    );

    Ok(())
}

fn comment_lines(headline: &str, env: &dyn EnvSource, tag: &str, notify: &Notify) -> Vec<String> {
    let ecr_repository = env.get(crate::config::ECR_REPOSITORY_VAR).unwrap_or_default();
    let codebase_repository = env.get(CODEBASE_REPOSITORY_VAR).unwrap_or_default();
    let commit = tag.strip_prefix("commit-").unwrap_or(tag);

    vec![
        headline.to_string(),
        format!("*Image*: {}:{}", ecr_repository, tag),
        format!(
            "*Commit*: <https://github.com/{repo}/commit/{commit}|{repo}@{commit}>",
            repo = codebase_repository,
            commit = commit
        ),
        format!("<{}|Build Logs>", notify.build_url()),
    ]
}

fn clone_deployment_repository(
    runner: &dyn CommandRunner,
    env: &dyn EnvSource,
) -> Result<(), DeployError> {
    let region = env.get("AWS_REGION");
    let account = env.get("AWS_ACCOUNT_ID");
    let connection_id = env.get("CODESTAR_CONNECTION_ID");
    let repository = env.get(DEPLOY_REPOSITORY_VAR);

    let (Some(region), Some(account), Some(connection_id), Some(repository)) =
        (region, account, connection_id, repository)
    else {
        return Err(DeployError::CannotCloneRepository(
            "AWS_REGION, AWS_ACCOUNT_ID, CODESTAR_CONNECTION_ID and DEPLOY_REPOSITORY \
             must be set"
                .to_string(),
        ));
    };

    info!("cloning repository {}", repository);
    let command = format!(
        "git clone https://codestar-connections.{region}.amazonaws.com/git-http/\
         {account}/{region}/{connection_id}/{repository}.git deploy",
        region = region,
        account = account,
        connection_id = connection_id,
        repository = repository,
    );

    let output = runner
        .run(&command)
        .map_err(|e| DeployError::CannotCloneRepository(e.to_string()))?;
    if !output.success() {
        return Err(DeployError::CannotCloneRepository(
            output.stderr.trim().to_string(),
        ));
    }

    Ok(())
}

/// The image tag to deploy: the explicit override, else the commit tag from
/// the pipeline's `imageDetail.json`
fn image_tag_for_deployment(env: &dyn EnvSource) -> Result<String, DeployError> {
    if let Some(tag) = env.get(IMAGE_TAG_VAR) {
        return Ok(tag);
    }

    info!("no {} set, assuming this run is in a pipeline", IMAGE_TAG_VAR);

    let source_dir = env.get(SOURCE_DIR_VAR).unwrap_or_else(|| ".".to_string());
    let detail_path = Path::new(&source_dir).join("imageDetail.json");
    let detail: Value = std::fs::read_to_string(&detail_path)
        .ok()
        .and_then(|contents| serde_json::from_str(&contents).ok())
        .ok_or_else(|| {
            DeployError::CannotDetectImageTag("no imageDetail.json found".to_string())
        })?;

    let tags: Vec<&str> = detail["ImageTags"]
        .as_array()
        .map(|tags| tags.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let pattern = env.get(ECR_TAG_PATTERN_VAR).unwrap_or_default();
    if !tags.iter().any(|tag| tag.starts_with(&pattern)) {
        return Err(DeployError::CannotDetectImageTag(
            "imageDetail.json does not contain a matching tag".to_string(),
        ));
    }

    let commit_tag = tags
        .iter()
        .find(|tag| tag.starts_with("commit-"))
        .ok_or_else(|| {
            DeployError::CannotDetectImageTag(
                "imageDetail.json does not contain a commit tag".to_string(),
            )
        })?;

    info!("found matching tag {}", commit_tag);
    Ok(commit_tag.to_string())
}

fn image_repository_url(env: &dyn EnvSource) -> Result<String, DeployError> {
    let account = env.get("AWS_ACCOUNT_ID");
    let region = env.get("AWS_REGION");
    let repository = env.get(crate::config::ECR_REPOSITORY_VAR);

    let (Some(account), Some(region), Some(repository)) = (account, region, repository) else {
        return Err(DeployError::MissingConfiguration(
            "AWS_ACCOUNT_ID, AWS_REGION and ECR_REPOSITORY must be set".to_string(),
        ));
    };

    let url = format!("{}.dkr.ecr.{}.amazonaws.com/{}", account, region, repository);
    info!("found repository URL {}", url);
    Ok(url)
}

/// Reads the build timestamp label back from the published image
fn deployment_reference(
    runner: &dyn CommandRunner,
    repository: &str,
    tag: &str,
) -> Result<String, DeployError> {
    let output = runner
        .run(&format!("regctl image config {}:{}", repository, tag))
        .map_err(|e| DeployError::Failed(e.to_string()))?;

    let config: Value =
        serde_json::from_str(&output.stdout).map_err(|_| DeployError::MissingTimestamp)?;
    let timestamp = config["config"]["Labels"][BUILD_TIMESTAMP_LABEL]
        .as_str()
        .filter(|value| !value.is_empty())
        .ok_or(DeployError::MissingTimestamp)?;

    info!("found image timestamp {}", timestamp);
    Ok(timestamp.to_string())
}
