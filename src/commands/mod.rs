//! Pipeline entry points
//!
//! One module per subcommand. Each exposes a thin `run` wiring up the
//! production collaborators and an `execute` carrying the actual flow against
//! the collaborator traits.

pub mod build;
pub mod deploy;
