//! Subprocess runner - executes external commands for provisioning actions

use crate::action::ActionError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

const REDACTED: &str = "***";

/// A fully described external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    secrets: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            secrets: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Never show this value in logs, errors or displayed command lines
    pub fn redact(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.push(secret);
        }
        self
    }

    /// Replace every registered secret in `text`
    pub fn redact_text(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), REDACTED))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        write!(f, "{}", self.redact_text(&line))
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (`None` when killed by a signal)
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Trait for command execution - allows scripted runners in tests
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ActionError>;

    /// Run a command and turn a non-zero exit into an error
    async fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutput, ActionError> {
        let output = self.run(spec).await?;
        if output.success() {
            return Ok(output);
        }

        let stderr = spec.redact_text(output.stderr.trim());
        Err(ActionError::CommandFailed {
            command: spec.to_string(),
            code: output.code,
            stderr: if stderr.is_empty() {
                "no error output".to_string()
            } else {
                stderr
            },
        })
    }
}

/// Runs commands as real child processes
///
/// Children are killed when the returned future is dropped, so a step
/// timeout or an operator interrupt never leaves a stray installer behind.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ActionError> {
        debug!("Spawning: {}", spec);

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let output = command.output().await.map_err(|e| ActionError::Spawn {
            command: spec.to_string(),
            source: e,
        })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: spec.redact_text(&String::from_utf8_lossy(&output.stdout)),
            stderr: spec.redact_text(&String::from_utf8_lossy(&output.stderr)),
        };

        if !result.success() {
            warn!(
                "{} exited with {:?}: {}",
                spec,
                result.code,
                result.stderr.trim()
            );
        } else {
            debug!("{} returned {} bytes of output", spec.program, result.stdout.len());
        }

        Ok(result)
    }
}
