//! packforge - buildpack-driven container image build and deploy pipeline
//!
//! packforge inspects a codebase (git revision, language manifests, Procfile),
//! resolves the target container repository, compiles a deterministic
//! `pack build` invocation and drives it end to end, reporting phase progress
//! to a chat channel.
//!
//! # Core Concepts
//!
//! - **Codebase**: the resolved build context - revision, detected languages,
//!   declared processes and build configuration, loaded once per run
//! - **Pack**: the build command compiler - turns a codebase into an
//!   ordered, byte-stable `pack build` command
//! - **Progress**: a forward-only four-phase state machine
//!   (setup, build, publish, deploy) rendered into an upsertable chat message
//!
//! # Collaborators
//!
//! External processes, the chat API, environment variables and the
//! end-of-life version catalog are reached through small traits
//! ([`exec::CommandRunner`], [`notify::ChatApi`], [`env::EnvSource`],
//! [`codebase::languages::end_of_life::VersionCatalog`]) so the resolution
//! rules stay pure and testable.

pub mod cli;
pub mod codebase;
pub mod commands;
pub mod config;
pub mod docker;
pub mod env;
pub mod exec;
pub mod notify;
pub mod pack;
pub mod progress;
pub mod publish;
pub mod util;

pub use codebase::revision::{Revision, RevisionError};
pub use codebase::{Codebase, CodebaseError};
pub use config::builder::{BuilderMatrix, BuilderSupport};
pub use config::{CodebaseConfig, ConfigError};
pub use env::{EnvSource, SystemEnv};
pub use exec::{CommandOutput, CommandRunner, ShellRunner};
pub use pack::{Pack, PackError};
pub use progress::{Phase, PhaseState, Progress};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name_is_packforge() {
        assert_eq!(NAME, "packforge");
    }
}
