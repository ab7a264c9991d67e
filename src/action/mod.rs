//! Provisioning actions - what a step actually does

pub mod auth;
pub mod error;
pub mod fetch;
pub mod git;
pub mod packages;
pub mod python;
pub mod runner;
pub mod tool;

pub use error::{ActionError, ActionOutcome};
pub use fetch::{ArtifactFetcher, HttpFetcher};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};

use crate::template::builtin::RulePreset;
use crate::template::{render_placeholders, RuleConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_true() -> bool {
    true
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_interpreter() -> String {
    "sh".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

/// The action a step performs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Run an arbitrary program
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        cwd: Option<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },

    /// Install system packages with apt-get
    Packages {
        packages: Vec<String>,
        #[serde(default = "default_true")]
        sudo: bool,
        #[serde(default = "default_true")]
        update: bool,
    },

    /// Make a command-line tool available, installing it when missing
    InstallTool {
        tool: String,
        source: ToolSource,
        /// Extra directories the installer is known to put the tool in
        #[serde(default)]
        search_paths: Vec<String>,
    },

    /// Clone a repository, or pull it when it is already there
    GitSync {
        url: String,
        dest: String,
        #[serde(default)]
        branch: Option<String>,
    },

    /// Create a Python virtual environment
    Venv {
        path: String,
        #[serde(default = "default_python")]
        python: String,
    },

    /// Install a project's Python dependencies into a venv
    PythonDeps {
        venv: String,
        project_dir: String,
        /// Packages installed when the project has no manifest
        #[serde(default)]
        fallback: Vec<String>,
    },

    /// Write a rendered template to disk
    Template {
        path: String,
        #[serde(default)]
        builtin: Option<String>,
        #[serde(default)]
        source: Option<String>,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        vars: BTreeMap<String, String>,
        #[serde(default)]
        executable: bool,
    },

    /// Rewrite an existing script with ordered rules and write it elsewhere
    PatchScript {
        source: String,
        dest: String,
        #[serde(default)]
        preset: Option<RulePreset>,
        #[serde(default)]
        repo_dir: Option<String>,
        #[serde(default)]
        rules: Vec<RuleConfig>,
    },

    /// Embed a token from a secret file in a repository's remote URL
    GitAuth {
        token_file: String,
        repo_dir: String,
        url: String,
        #[serde(default = "default_remote")]
        remote: String,
    },
}

/// Where a tool's installer comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSource {
    /// Downloaded installer pinned by its SHA-256 digest
    Artifact {
        url: String,
        sha256: String,
        #[serde(default = "default_interpreter")]
        interpreter: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// A local command that performs the installation
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl Action {
    /// Short label for plans and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Command { .. } => "command",
            Action::Packages { .. } => "packages",
            Action::InstallTool { .. } => "install_tool",
            Action::GitSync { .. } => "git_sync",
            Action::Venv { .. } => "venv",
            Action::PythonDeps { .. } => "python_deps",
            Action::Template { .. } => "template",
            Action::PatchScript { .. } => "patch_script",
            Action::GitAuth { .. } => "git_auth",
        }
    }

    /// The action probes its own target before mutating anything
    pub fn checks_itself(&self) -> bool {
        matches!(self, Action::InstallTool { .. } | Action::Venv { .. })
    }

    /// Substitute `{{ name }}` placeholders in every string field
    pub fn render(&self, vars: &BTreeMap<String, String>) -> Action {
        let r = |s: &String| render_placeholders(s, vars);
        let all = |items: &Vec<String>| items.iter().map(r).collect::<Vec<_>>();
        let map = |m: &BTreeMap<String, String>| {
            m.iter()
                .map(|(k, v)| (k.clone(), r(v)))
                .collect::<BTreeMap<_, _>>()
        };

        match self {
            Action::Command {
                program,
                args,
                cwd,
                env,
            } => Action::Command {
                program: r(program),
                args: all(args),
                cwd: cwd.as_ref().map(r),
                env: map(env),
            },
            Action::Packages {
                packages,
                sudo,
                update,
            } => Action::Packages {
                packages: all(packages),
                sudo: *sudo,
                update: *update,
            },
            Action::InstallTool {
                tool,
                source,
                search_paths,
            } => Action::InstallTool {
                tool: r(tool),
                source: match source {
                    ToolSource::Artifact {
                        url,
                        sha256,
                        interpreter,
                        args,
                    } => ToolSource::Artifact {
                        url: r(url),
                        sha256: sha256.clone(),
                        interpreter: r(interpreter),
                        args: all(args),
                    },
                    ToolSource::Command { program, args } => ToolSource::Command {
                        program: r(program),
                        args: all(args),
                    },
                },
                search_paths: all(search_paths),
            },
            Action::GitSync { url, dest, branch } => Action::GitSync {
                url: r(url),
                dest: r(dest),
                branch: branch.as_ref().map(r),
            },
            Action::Venv { path, python } => Action::Venv {
                path: r(path),
                python: r(python),
            },
            Action::PythonDeps {
                venv,
                project_dir,
                fallback,
            } => Action::PythonDeps {
                venv: r(venv),
                project_dir: r(project_dir),
                fallback: all(fallback),
            },
            // Template bodies are rendered by the emitter with `vars` layered on top
            Action::Template {
                path,
                builtin,
                source,
                content,
                vars: extra,
                executable,
            } => Action::Template {
                path: r(path),
                builtin: builtin.clone(),
                source: source.as_ref().map(r),
                content: content.clone(),
                vars: map(extra),
                executable: *executable,
            },
            Action::PatchScript {
                source,
                dest,
                preset,
                repo_dir,
                rules,
            } => Action::PatchScript {
                source: r(source),
                dest: r(dest),
                preset: *preset,
                repo_dir: repo_dir.as_ref().map(r),
                rules: rules.iter().map(|rule| rule.render(vars)).collect(),
            },
            Action::GitAuth {
                token_file,
                repo_dir,
                url,
                remote,
            } => Action::GitAuth {
                token_file: r(token_file),
                repo_dir: r(repo_dir),
                url: r(url),
                remote: r(remote),
            },
        }
    }
}
