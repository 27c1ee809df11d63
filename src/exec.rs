//! External process collaborator
//!
//! All git, docker, pack and deployment tool invocations go through
//! [`CommandRunner`] so the pipeline logic can be exercised against scripted
//! outputs. [`ShellRunner`] is the production implementation and runs
//! commands through `sh -c`, matching the shell pipelines some commands rely
//! on (e.g. `get-login-password | docker login`).

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::thread;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
}

/// Captured result of an external command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes external commands, either captured or line-streamed
pub trait CommandRunner {
    /// Runs a command to completion, capturing stdout and stderr
    fn run(&self, command: &str) -> Result<CommandOutput, ExecError>;

    /// Runs a command, invoking `on_line` for every stdout line as it arrives
    ///
    /// Blocks until the command exits; stderr is captured for the result.
    fn stream(
        &self,
        command: &str,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<CommandOutput, ExecError>;

    /// Starts a command without waiting for it (daemon startup)
    fn spawn(&self, command: &str) -> Result<(), ExecError>;
}

/// Production runner backed by `sh -c`
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

impl ShellRunner {
    fn shell(command: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str) -> Result<CommandOutput, ExecError> {
        let output = Self::shell(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| ExecError::Spawn {
                command: command.to_string(),
                source,
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn stream(
        &self,
        command: &str,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<CommandOutput, ExecError> {
        let mut child = Self::shell(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecError::Spawn {
                command: command.to_string(),
                source,
            })?;

        // Drain stderr on its own thread; a child blocked on a full stderr
        // pipe would otherwise never produce the stdout lines we wait for.
        let stderr_reader = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut bytes = Vec::new();
                let _ = pipe.read_to_end(&mut bytes);
                String::from_utf8_lossy(&bytes).into_owned()
            })
        });

        let mut stdout = String::new();
        if let Some(pipe) = child.stdout.take() {
            for line in BufReader::new(pipe).lines() {
                let line = line.map_err(|source| ExecError::Spawn {
                    command: command.to_string(),
                    source,
                })?;
                on_line(&line);
                stdout.push_str(&line);
                stdout.push('\n');
            }
        }

        let status = child.wait().map_err(|source| ExecError::Spawn {
            command: command.to_string(),
            source,
        })?;
        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();

        Ok(CommandOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
        })
    }

    fn spawn(&self, command: &str) -> Result<(), ExecError> {
        Self::shell(command)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ExecError::Spawn {
                command: command.to_string(),
                source,
            })?;
        Ok(())
    }
}

/// Scripted runner returning canned outputs per command, used as a test double
///
/// Commands without a scripted entry succeed with empty output. Every executed
/// command is recorded for assertion.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    outputs: HashMap<String, CommandOutput>,
    executed: std::cell::RefCell<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, command: &str, output: CommandOutput) -> Self {
        self.outputs.insert(command.to_string(), output);
        self
    }

    pub fn with_stdout(self, command: &str, stdout: &str) -> Self {
        self.with_output(
            command,
            CommandOutput {
                exit_code: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        )
    }

    pub fn with_failure(self, command: &str, exit_code: i32, stderr: &str) -> Self {
        self.with_output(
            command,
            CommandOutput {
                exit_code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        )
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.borrow().clone()
    }

    fn lookup(&self, command: &str) -> CommandOutput {
        self.executed.borrow_mut().push(command.to_string());
        self.outputs.get(command).cloned().unwrap_or_default()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &str) -> Result<CommandOutput, ExecError> {
        Ok(self.lookup(command))
    }

    fn stream(
        &self,
        command: &str,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<CommandOutput, ExecError> {
        let output = self.lookup(command);
        for line in output.stdout.lines() {
            on_line(line);
        }
        Ok(output)
    }

    fn spawn(&self, command: &str) -> Result<(), ExecError> {
        self.lookup(command);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_runner_captures_output() {
        let output = ShellRunner.run("echo hello").unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[test]
    fn test_shell_runner_reports_exit_code() {
        let output = ShellRunner.run("exit 3").unwrap();
        assert!(!output.success());
        assert_eq!(output.exit_code, 3);
    }

    #[test]
    fn test_shell_runner_streams_lines() {
        let mut lines = Vec::new();
        let output = ShellRunner
            .stream("printf 'one\\ntwo\\n'", &mut |line| {
                lines.push(line.to_string())
            })
            .unwrap();
        assert!(output.success());
        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(output.stdout, "one\ntwo\n");
    }

    #[test]
    fn test_shell_runner_streams_past_a_full_stderr_pipe() {
        // Pipe buffers hold ~64K; a child writing far more to stderr before
        // its first stdout line must still run to completion.
        let mut lines = Vec::new();
        let output = ShellRunner
            .stream(
                "head -c 300000 /dev/zero | tr '\\0' x 1>&2; echo done; exit 7",
                &mut |line| lines.push(line.to_string()),
            )
            .unwrap();
        assert_eq!(output.exit_code, 7);
        assert_eq!(lines, vec!["done"]);
        assert_eq!(output.stderr.len(), 300_000);
    }

    #[test]
    fn test_scripted_runner_returns_canned_output() {
        let runner = ScriptedRunner::new().with_stdout("git status", "clean");
        let output = runner.run("git status").unwrap();
        assert_eq!(output.stdout, "clean");
        assert_eq!(runner.executed(), vec!["git status"]);
    }

    #[test]
    fn test_scripted_runner_defaults_to_success() {
        let runner = ScriptedRunner::new();
        assert!(runner.run("anything").unwrap().success());
    }
}
