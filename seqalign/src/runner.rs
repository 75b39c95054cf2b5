//! External command runner.
//!
//! Every pipeline stage is one [`CommandSpec`] handed to a [`CommandRunner`].
//! The runner only launches the process and waits for it: a nonzero exit is
//! reported in [`CommandOutcome::exit_code`] and never turned into an error
//! here. Deciding whether a failed stage is fatal belongs to the pipeline.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use process_utils::{SHELL, shell_join, tokio_command, tokio_shell};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::{debug, warn};

use crate::{Error, Result};

/// What to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// A program with an argument list, executed directly.
    Program { program: String, args: Vec<String> },
    /// A shell pipeline, executed through the platform shell with `pipefail`
    /// so that a failure anywhere in the pipe fails the whole command.
    Shell(String),
}

/// Description of one external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Short name used in logs.
    pub label: String,
    pub invocation: Invocation,
    /// Working directory for the child; inherits ours when `None`.
    pub current_dir: Option<PathBuf>,
    /// Whether stdout is captured and returned instead of inherited.
    pub capture_stdout: bool,
}

impl CommandSpec {
    pub fn program<I, S>(label: impl Into<String>, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label: label.into(),
            invocation: Invocation::Program {
                program: program.into(),
                args: args.into_iter().map(Into::into).collect(),
            },
            current_dir: None,
            capture_stdout: false,
        }
    }

    pub fn shell(label: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            invocation: Invocation::Shell(script.into()),
            current_dir: None,
            capture_stdout: false,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn capture_stdout(mut self) -> Self {
        self.capture_stdout = true;
        self
    }

    /// Name of the executable, or of the shell for pipelines.
    pub fn program_name(&self) -> &str {
        match &self.invocation {
            Invocation::Program { program, .. } => program,
            Invocation::Shell(_) => SHELL,
        }
    }

    /// Command line as a shell would see it.
    pub fn command_line(&self) -> String {
        match &self.invocation {
            Invocation::Program { program, args } => shell_join(
                std::iter::once(program.as_str()).chain(args.iter().map(String::as_str)),
            ),
            Invocation::Shell(script) => script.clone(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.command_line())
    }
}

/// Result of running a command to completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutcome {
    /// Exit code; `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured stdout, when requested.
    pub stdout: Option<String>,
    pub duration: Duration,
}

impl CommandOutcome {
    /// Successful outcome with the given stdout. Mostly useful for fakes.
    pub fn success(stdout: Option<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout,
            duration: Duration::ZERO,
        }
    }

    /// Failed outcome with the given exit code.
    pub fn failure(exit_code: i32) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: None,
            duration: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Captured stdout with surrounding whitespace removed.
    pub fn trimmed_stdout(&self) -> &str {
        self.stdout.as_deref().map(str::trim).unwrap_or_default()
    }
}

/// Executes external commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `spec` to completion.
    ///
    /// Only failing to start or to wait for the process is an error.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome>;
}

/// [`CommandRunner`] backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome> {
        let start = Instant::now();

        let mut command = match &spec.invocation {
            Invocation::Program { program, args } => {
                let mut c = tokio_command(program);
                c.args(args);
                c
            }
            Invocation::Shell(script) => tokio_shell(script),
        };

        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }

        command.stdin(Stdio::null()).stderr(Stdio::piped());
        if spec.capture_stdout {
            command.stdout(Stdio::piped());
        } else {
            command.stdout(Stdio::inherit());
        }

        debug!(label = %spec.label, command = %spec.command_line(), "Spawning command");

        let mut child = command
            .spawn()
            .map_err(|e| Error::spawn(spec.program_name(), e))?;

        let stderr_handle = child.stderr.take().map(|stderr| {
            let label = spec.label.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.to_lowercase().contains("error") {
                        warn!(label = %label, "stderr: {}", line);
                    } else {
                        debug!(label = %label, "stderr: {}", line);
                    }
                }
            })
        });

        let stdout_handle = child.stdout.take().map(|mut stdout| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stdout.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        let status = child
            .wait()
            .await
            .map_err(|e| Error::spawn(spec.program_name(), e))?;

        if let Some(handle) = stderr_handle {
            let _ = handle.await;
        }
        let stdout = match stdout_handle {
            Some(handle) => Some(handle.await.unwrap_or_default()),
            None => None,
        };

        let outcome = CommandOutcome {
            exit_code: status.code(),
            stdout,
            duration: start.elapsed(),
        };

        debug!(
            label = %spec.label,
            exit_code = ?outcome.exit_code,
            duration_secs = outcome.duration.as_secs_f64(),
            "Command finished"
        );

        Ok(outcome)
    }
}
