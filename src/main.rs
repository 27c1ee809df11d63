use packforge::cli::{CliArgs, Commands};
use packforge::commands::{build, deploy};
use packforge::util::logging;
use packforge::VERSION;

use clap::Parser;
use tracing::{debug, error};

fn main() {
    let args = CliArgs::parse();
    logging::init_from_args(args.log_level.as_deref(), args.verbose, args.quiet);

    debug!("packforge v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let result = match &args.command {
        Commands::Build(build_args) => build::run(build_args),
        Commands::Deploy(deploy_args) => deploy::run(deploy_args),
    };

    match result {
        Ok(()) => {}
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
