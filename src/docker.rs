//! Docker daemon collaborator
//!
//! Daemon startup with a bounded readiness poll and registry logins for the
//! public and private ECR flavours, plus an optional Docker Hub login when the
//! build runs behind a CodeStar connection.

use crate::config::PUBLIC_REGISTRY;
use crate::env::EnvSource;
use crate::exec::{CommandRunner, ExecError};
use serde::Deserialize;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Presence marks a CodeBuild environment with Docker Hub credentials in SSM
pub const CODESTAR_CONNECTION_VAR: &str = "CODESTAR_CONNECTION_ARN";

const DOCKER_HUB_CREDENTIALS_PARAMETER: &str = "/codebuild/docker_hub_credentials";

const DAEMON_COMMAND: &str = "nohup /usr/local/bin/dockerd --host=unix:///var/run/docker.sock \
                              --host=tcp://127.0.0.1:2375 --storage-driver=overlay2";

const START_ATTEMPTS: u32 = 60;
const START_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum DockerError {
    #[error("docker is not installed")]
    NotInstalled,

    #[error("docker daemon did not start within {0} seconds")]
    StartTimeout(u64),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

#[derive(Debug, Deserialize)]
struct HubCredentials {
    username: String,
    password: String,
}

/// Whether the daemon is up and answering
pub fn running(runner: &dyn CommandRunner) -> Result<bool, DockerError> {
    let output = runner.run("docker ps")?;
    if output.exit_code == 127 {
        return Err(DockerError::NotInstalled);
    }
    Ok(output.success())
}

/// Starts the daemon if needed and waits for it to answer
pub fn start(runner: &dyn CommandRunner) -> Result<(), DockerError> {
    start_with(runner, START_ATTEMPTS, START_INTERVAL)
}

fn start_with(
    runner: &dyn CommandRunner,
    attempts: u32,
    interval: Duration,
) -> Result<(), DockerError> {
    if !running(runner)? {
        runner.spawn(DAEMON_COMMAND)?;
    }

    for _ in 0..attempts {
        if running(runner)? {
            return Ok(());
        }
        thread::sleep(interval);
    }

    Err(DockerError::StartTimeout(
        attempts as u64 * interval.as_secs(),
    ))
}

/// Logs into the registry, and into Docker Hub when running behind CodeStar
///
/// Hub credential failures are logged and skipped; only a failure to run the
/// login commands themselves is an error.
pub fn login(
    runner: &dyn CommandRunner,
    env: &dyn EnvSource,
    registry: &str,
) -> Result<(), DockerError> {
    if env.get(CODESTAR_CONNECTION_VAR).is_some() {
        login_docker_hub(runner);
    }

    let command = if registry == PUBLIC_REGISTRY {
        format!(
            "aws ecr-public get-login-password --region us-east-1 \
             | docker login --username AWS --password-stdin {}",
            registry
        )
    } else {
        // the region is the fourth dot-separated label of the registry host
        let region = registry.split('.').nth(3).unwrap_or_default();
        format!(
            "aws ecr get-login-password --region {} \
             | docker login --username AWS --password-stdin {}",
            region, registry
        )
    };

    info!("running: {}", command);
    let output = runner.run(&command)?;
    if !output.success() {
        warn!("registry login for {} failed: {}", registry, output.stderr.trim());
    }

    Ok(())
}

fn login_docker_hub(runner: &dyn CommandRunner) {
    info!("logging into Docker Hub");

    let fetch = format!(
        "aws ssm get-parameter --name {} --with-decryption \
         --query Parameter.Value --output text",
        DOCKER_HUB_CREDENTIALS_PARAMETER
    );

    let output = match runner.run(&fetch) {
        Ok(output) if output.success() => output,
        Ok(output) => {
            warn!("failed to fetch Docker Hub credentials: {}", output.stderr.trim());
            return;
        }
        Err(e) => {
            warn!("failed to fetch Docker Hub credentials: {}", e);
            return;
        }
    };

    let credentials: HubCredentials = match serde_json::from_str(output.stdout.trim()) {
        Ok(credentials) => credentials,
        Err(e) => {
            warn!("Docker Hub credentials are not valid: {}", e);
            return;
        }
    };

    let login = format!(
        "docker login --username {} --password {}",
        credentials.username, credentials.password
    );
    match runner.run(&login) {
        Ok(output) if !output.success() => {
            warn!("Docker Hub login failed: {}", output.stderr.trim())
        }
        Err(e) => warn!("Docker Hub login failed: {}", e),
        Ok(_) => {}
    }
}
