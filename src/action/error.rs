//! Action error and outcome types

use crate::template::patcher::PatchError;
use std::path::PathBuf;
use thiserror::Error;

/// Error types for provisioning actions
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}: {stderr}", exit_label(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error(
        "Secret token file {} not found. Create it with your access token, e.g. \
         `printf '%s' <token> > {} && chmod 600 {}`",
        .path.display(), .path.display(), .path.display()
    )]
    MissingSecret { path: PathBuf },

    #[error("{what} is missing: {}", .path.display())]
    MissingPrerequisite { what: String, path: PathBuf },

    #[error(
        "`{tool}` is still not on the search path after installation (searched: {searched}). \
         The installer may have put it somewhere else; add that directory to search_paths"
    )]
    ToolNotFoundAfterInstall { tool: String, searched: String },

    #[error("Download of {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("Remote URL must use https to carry a token: {0}")]
    UnsupportedRemote(String),

    #[error("Connectivity probe against remote '{remote}' failed: {detail}")]
    ProbeFailed { remote: String, detail: String },

    #[error("Template '{0}' is not available")]
    UnknownTemplate(String),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

impl ActionError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ActionError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether another attempt could plausibly succeed
    ///
    /// Operator mistakes and integrity failures never get retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActionError::CommandFailed { .. }
                | ActionError::Timeout(_)
                | ActionError::Fetch { .. }
                | ActionError::ProbeFailed { .. }
        )
    }
}

/// What a successful action produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Captured output or a short description of what was done
    pub output: String,

    /// Set when the action found its work already done and changed nothing
    pub already_satisfied: Option<String>,

    /// Soft failure: the action reports a problem but the run continues
    pub warning: Option<String>,

    /// Tool name and the resolved path of its executable
    pub resolved_tool: Option<(String, PathBuf)>,
}

impl ActionOutcome {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Self::default()
        }
    }

    pub fn satisfied(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            output: reason.clone(),
            already_satisfied: Some(reason),
            ..Self::default()
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>, path: PathBuf) -> Self {
        self.resolved_tool = Some((tool.into(), path));
        self
    }
}
