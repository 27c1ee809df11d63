//! Command line interface definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Buildpack-driven container image build and deploy pipeline
#[derive(Parser, Debug)]
#[command(
    name = "packforge",
    about = "Buildpack-driven container image build and deploy pipeline",
    version,
    long_about = "packforge inspects a codebase to discover its revision, runtime \
                  languages and declared processes, compiles a deterministic pack \
                  build command, runs the build and reports progress to a chat \
                  channel."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Increase verbosity")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Build an image from the current codebase",
        long_about = "Resolves the codebase revision, languages and configuration, \
                      compiles a pack build command and runs it.\n\n\
                      Examples:\n  \
                      packforge build\n  \
                      packforge build --publish\n  \
                      packforge build --publish --send-notifications"
    )]
    Build(BuildArgs),

    #[command(
        about = "Deploy a previously built image to a list of services",
        long_about = "Clones the deployment repository, discovers the image tag to \
                      deploy and runs the deployment tool for each configured service."
    )]
    Deploy(DeployArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    #[arg(
        value_name = "PATH",
        help = "Path to the codebase (defaults to current directory)"
    )]
    pub path: Option<PathBuf>,

    #[arg(long, help = "Publish the built image")]
    pub publish: bool,

    #[arg(long, help = "Send chat notifications")]
    pub send_notifications: bool,

    #[arg(
        long,
        value_name = "IMAGE",
        help = "Runner image to use as the base for the application image"
    )]
    pub with_runner_image: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct DeployArgs {
    #[arg(long, help = "Send chat notifications")]
    pub send_notifications: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_build_args_parse() {
        let args = CliArgs::parse_from(["packforge", "build", "--publish"]);
        match args.command {
            Commands::Build(build) => {
                assert!(build.publish);
                assert!(!build.send_notifications);
                assert!(build.path.is_none());
            }
            _ => panic!("expected build command"),
        }
    }

    #[test]
    fn test_deploy_args_parse() {
        let args = CliArgs::parse_from(["packforge", "deploy", "--send-notifications"]);
        match args.command {
            Commands::Deploy(deploy) => assert!(deploy.send_notifications),
            _ => panic!("expected deploy command"),
        }
    }
}
