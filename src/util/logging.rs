//! Structured logging setup
//!
//! Initializes the `tracing` subscriber once, honouring `RUST_LOG` when set
//! and falling back to CLI flags or `PACKFORGE_LOG_LEVEL` otherwise.

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Parses a log level from a string, defaulting to INFO on invalid input
pub fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

/// Initializes logging from CLI arguments
///
/// Precedence: explicit `--log-level`, then `--verbose`/`--quiet`, then the
/// `PACKFORGE_LOG_LEVEL` environment variable, then INFO.
pub fn init_from_args(log_level: Option<&str>, verbose: bool, quiet: bool) {
    let level = if let Some(level_str) = log_level {
        parse_level(level_str)
    } else if verbose {
        Level::DEBUG
    } else if quiet {
        Level::ERROR
    } else {
        let level_str = env::var("PACKFORGE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        parse_level(&level_str)
    };

    init_logging(level);
}

/// Initializes the logging system at the given level
///
/// Can only be called once - subsequent calls are ignored.
pub fn init_logging(level: Level) {
    INIT.call_once(|| {
        let mut filter = EnvFilter::from_default_env();

        if env::var("RUST_LOG").is_err() {
            filter = filter
                .add_directive(
                    format!("packforge={}", level)
                        .parse()
                        .unwrap_or_else(|_| Level::INFO.into()),
                )
                .add_directive("hyper=warn".parse().expect("static directive"))
                .add_directive("reqwest=warn".parse().expect("static directive"));
        }

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    });
}
