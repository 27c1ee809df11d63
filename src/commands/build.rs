//! The `build` subcommand
//!
//! Loads the codebase, posts the initial progress message, prepares the
//! codebase files, runs the compiled pack command with phase transitions wired
//! to the build output markers and tears the codebase down again in every
//! path.

use crate::cli::BuildArgs;
use crate::codebase::languages::end_of_life::{EndOfLifeClient, VersionCatalog};
use crate::codebase::Codebase;
use crate::docker;
use crate::env::{EnvSource, SystemEnv};
use crate::exec::{CommandRunner, ShellRunner};
use crate::notify::{MessageContext, Notify};
use crate::pack::{BuildEvent, Pack};
use crate::progress::{Phase, Progress};
use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::info;

pub fn run(args: &BuildArgs) -> anyhow::Result<()> {
    let path = args.path.clone().unwrap_or_else(|| PathBuf::from("."));
    let env = SystemEnv;
    let notify = if args.send_notifications {
        Notify::new(&env)?
    } else {
        Notify::disabled()
    };

    execute(
        &path,
        args,
        &ShellRunner,
        &env,
        &EndOfLifeClient::default(),
        notify,
    )
}

/// Runs the build flow against explicit collaborators
pub fn execute(
    path: &Path,
    args: &BuildArgs,
    runner: &dyn CommandRunner,
    env: &dyn EnvSource,
    catalog: &dyn VersionCatalog,
    mut notify: Notify,
) -> anyhow::Result<()> {
    let mut codebase =
        Codebase::load(path, runner, env, catalog).context("failed to load codebase")?;
    let context = message_context(&codebase);

    let mut progress = Progress::new();
    progress.start(Phase::Setup)?;
    notify.post_build_progress(&progress, &context);

    // the chat reference doubles as the image build timestamp so the deploy
    // command can find its way back to this message
    let build_timestamp = notify.reference().map(str::to_string);

    let result = build_image(
        &mut codebase,
        args,
        runner,
        env,
        &mut progress,
        &mut notify,
        &context,
        build_timestamp,
    );

    codebase.teardown();

    if let Err(e) = result {
        progress.fail_current();
        notify.post_build_progress(&progress, &context);
        notify.post_job_comment(
            &format!(
                "Build: {}@{} cancelled",
                context.repository_name, context.revision_commit
            ),
            &[format!("Error: {:#}", e)],
            false,
        );
        return Err(e);
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn build_image(
    codebase: &mut Codebase,
    args: &BuildArgs,
    runner: &dyn CommandRunner,
    env: &dyn EnvSource,
    progress: &mut Progress,
    notify: &mut Notify,
    context: &MessageContext,
    build_timestamp: Option<String>,
) -> anyhow::Result<()> {
    if !docker::running(runner)? {
        info!("docker is not running, starting up");
        docker::start(runner)?;
    }
    info!("docker is running, continuing with build");

    docker::login(runner, env, &codebase.config.registry(env)?)?;

    codebase.setup()?;

    let pack = Pack::new(codebase, env, build_timestamp)?
        .with_run_image(args.with_runner_image.clone());

    log_discovery(codebase, &pack, args.publish, env)?;
    notify.post_job_comment(
        &format!(
            "Build: {}@{} update",
            context.repository_name, context.revision_commit
        ),
        &discovery_lines(codebase, &pack),
        false,
    );

    pack.build(args.publish, runner, env, &mut |event| {
        let next = match event {
            BuildEvent::Building => Phase::Build,
            BuildEvent::Exporting => Phase::Publish,
        };
        let current = progress.current_phase();
        let _ = progress.succeed(current);
        let _ = progress.start(next);
        notify.post_build_progress(progress, context);
    })?;

    let current = progress.current_phase();
    let _ = progress.succeed(current);
    notify.post_build_progress(progress, context);

    Ok(())
}

fn log_discovery(
    codebase: &Codebase,
    pack: &Pack,
    publish: bool,
    env: &dyn EnvSource,
) -> anyhow::Result<()> {
    let revision = &codebase.revision;
    info!(
        "found revision: repository={}, commit={:?}, branch={:?}, tag={:?}",
        revision.repository_name().unwrap_or_default(),
        revision.commit,
        revision.branch,
        revision.tag
    );
    info!("using repository: {}", pack.repository());
    if publish {
        if let Some(additional) = codebase.config.additional_repository(env)? {
            info!("pushing image to additional repository: {}", additional);
        }
    }
    info!("found processes: {:?}", codebase.processes.names());
    info!("found languages: {}", codebase.languages);
    info!("using builder: {}", codebase.config.builder);
    info!("using buildpacks: {:?}", pack.buildpacks());
    Ok(())
}

fn discovery_lines(codebase: &Codebase, pack: &Pack) -> Vec<String> {
    let revision = &codebase.revision;
    let commit = revision.commit.clone().unwrap_or_default();
    vec![
        format!(
            "*GitHub Repository*: {}",
            revision.repository_name().unwrap_or_default()
        ),
        format!(
            "*Commit*: {} *Branch*: {} *Tag*: {}",
            commit,
            revision.branch.clone().unwrap_or_default(),
            revision.tag.clone().unwrap_or_default()
        ),
        format!("*Image*: {}:commit-{}", pack.repository(), commit),
        format!("*Processes*: {}", codebase.processes.names().join(", ")),
        format!("*Languages*: {}", codebase.languages),
        format!("*Builder*: {}", codebase.config.builder),
        format!("*Buildpacks*: {}", pack.buildpacks().join(", ")),
    ]
}

fn message_context(codebase: &Codebase) -> MessageContext {
    MessageContext {
        repository_name: codebase.revision.repository_name().unwrap_or_default(),
        revision_commit: codebase.revision.commit.clone().unwrap_or_default(),
        repository_url: codebase.revision.repository_url().unwrap_or_default(),
    }
}
