//! Provisioning context - shared state and variables

use crate::template::render_placeholders;
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Directory (under the working directory) holding provisioning metadata
pub const STATE_DIR: &str = ".provision";

/// Execution context for a provisioning run
///
/// Tool locations resolved by install steps are recorded here and handed
/// to later steps explicitly, instead of relying on a re-sourced shell
/// environment.
#[derive(Debug, Clone)]
pub struct ProvisionContext {
    /// Directory relative paths are resolved against
    pub workdir: PathBuf,

    /// Home directory used for `~` expansion
    pub home: PathBuf,

    /// Global and user-defined variables
    pub variables: BTreeMap<String, String>,

    /// Resolved executables keyed by tool name
    pub tools: BTreeMap<String, PathBuf>,
}

impl ProvisionContext {
    /// Create a context with explicit directories
    pub fn new(workdir: impl Into<PathBuf>, home: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            home: home.into(),
            variables: BTreeMap::new(),
            tools: BTreeMap::new(),
        }
    }

    /// Create a context for the current user
    pub fn from_environment(workdir: impl Into<PathBuf>) -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Cannot determine the home directory"))?;
        Ok(Self::new(workdir, home))
    }

    pub fn with_variables(mut self, variables: BTreeMap<String, String>) -> Self {
        self.variables.extend(variables);
        self
    }

    /// Get all variables available for rendering
    pub fn rendering_variables(&self) -> BTreeMap<String, String> {
        let mut vars = self.variables.clone();
        vars.insert("workdir".to_string(), self.workdir.display().to_string());
        vars.insert("home".to_string(), self.home.display().to_string());

        for (name, path) in &self.tools {
            vars.insert(format!("tools.{}", name), path.display().to_string());
        }

        vars
    }

    /// Substitute `{{ name }}` placeholders in `text`
    pub fn render(&self, text: &str) -> String {
        render_placeholders(text, &self.rendering_variables())
    }

    /// Resolve a configured path: placeholders, then `~`, then relative to workdir
    pub fn resolve_path(&self, raw: &str) -> PathBuf {
        let rendered = self.render(raw);
        let home = self.home.display().to_string();
        let expanded = shellexpand::tilde_with_context(&rendered, || Some(home.as_str()));
        let path = Path::new(expanded.as_ref());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workdir.join(path)
        }
    }

    /// Record where a tool ended up after installation
    pub fn record_tool(&mut self, name: &str, path: PathBuf) {
        self.tools.insert(name.to_string(), path);
    }

    /// Get a tool's resolved executable
    pub fn tool(&self, name: &str) -> Option<&PathBuf> {
        self.tools.get(name)
    }

    /// Directories of every recorded tool, searched before `PATH`
    pub fn tool_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .tools
            .values()
            .filter_map(|path| path.parent().map(Path::to_path_buf))
            .collect();
        dirs.sort();
        dirs.dedup();
        dirs
    }

    /// Location of a step's version stamp
    pub fn stamp_path(&self, step_id: &str) -> PathBuf {
        self.workdir.join(STATE_DIR).join("stamps").join(step_id)
    }

    /// Read a step's stored stamp, if any
    pub fn read_stamp(&self, step_id: &str) -> Option<String> {
        std::fs::read_to_string(self.stamp_path(step_id))
            .ok()
            .map(|s| s.trim().to_string())
    }

    /// Store a step's stamp after it ran successfully
    pub fn write_stamp(&self, step_id: &str, value: &str) -> std::io::Result<()> {
        let path = self.stamp_path(step_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, format!("{}\n", value))
    }

    /// Scratch directory for downloaded artifacts
    pub fn cache_dir(&self) -> PathBuf {
        self.workdir.join(STATE_DIR).join("cache")
    }
}
