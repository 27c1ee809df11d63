//! Procfile process declarations
//!
//! Parses the Procfile into named process types with their `&&`-chained
//! command pipelines, dropping sub-commands on the filter denylist before the
//! file is rewritten for the container runtime.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Sub-commands removed from every process pipeline
pub const FILTERED_COMMANDS: &[&str] = &["collectstatic"];

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("codebase has no Procfile")]
    NoProcfile,

    #[error("failed to read Procfile: {0}")]
    Io(#[from] io::Error),
}

/// One declared process type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Process {
    pub name: String,
    pub commands: Vec<String>,
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.commands.join(" && "))
    }
}

/// Ordered process list bound to the Procfile it was read from
#[derive(Debug, Clone)]
pub struct Processes {
    path: PathBuf,
    entries: Vec<Process>,
}

impl Processes {
    pub fn entries(&self) -> &[Process] {
        &self.entries
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|p| p.name.as_str()).collect()
    }

    /// Rewrites the Procfile with the filtered process list
    pub fn write(&self) -> io::Result<()> {
        fs::write(&self.path, format!("{}", self))
    }
}

impl fmt::Display for Processes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.entries.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", lines.join("\n"))
    }
}

/// Loads and filters the Procfile at `path/Procfile`
pub fn load_processes(path: &Path) -> Result<Processes, ProcessError> {
    let procfile = path.join("Procfile");
    if !procfile.exists() {
        return Err(ProcessError::NoProcfile);
    }

    let contents = fs::read_to_string(&procfile)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        let Some((name, pipeline)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }

        let commands: Vec<String> = pipeline
            .split("&&")
            .map(str::trim)
            .filter(|command| !command.is_empty())
            .filter(|command| !FILTERED_COMMANDS.iter().any(|denied| command.contains(denied)))
            .map(str::to_string)
            .collect();

        entries.push(Process {
            name: name.to_string(),
            commands,
        });
    }

    Ok(Processes {
        path: procfile,
        entries,
    })
}
