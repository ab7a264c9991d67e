//! Provisioning configuration from YAML

use crate::action::{Action, ToolSource};
use crate::core::Pipeline;
use crate::template::patcher::RewriteRule;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "provision.yaml";

/// Upper bound on the per-step retry budget
pub const MAX_RETRIES: usize = 10;

/// Top-level provisioning configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// Name of the provisioning run (used for history)
    pub name: String,

    /// Configuration version (optional)
    #[serde(default)]
    pub version: Option<String>,

    /// Variables available to every step as `{{ name }}`
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    /// Defaults applied to steps that don't override them
    #[serde(default)]
    pub defaults: StepDefaultsConfig,

    /// Steps, executed strictly in this order
    pub steps: Vec<StepConfig>,
}

/// Per-run defaults for timeouts and retry budgets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepDefaultsConfig {
    /// Default timeout for a single attempt (in seconds)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Default number of retries after the first attempt
    #[serde(default)]
    pub retries: Option<usize>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Unique step identifier
    pub id: String,

    /// Human-readable step name
    pub name: String,

    /// Optional step description
    #[serde(default)]
    pub description: Option<String>,

    /// What the step does
    pub action: Action,

    /// Explicit precondition: when it holds the action is skipped
    #[serde(default)]
    pub skip_if: Option<PreconditionConfig>,

    /// What a failing action means for the rest of the run
    #[serde(default)]
    pub on_failure: FailurePolicy,

    /// Timeout for one attempt (overrides defaults)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Retries after the first attempt (overrides defaults)
    #[serde(default)]
    pub retries: Option<usize>,

    /// Version stamp; the step only counts as done when the stored stamp matches
    #[serde(default)]
    pub stamp: Option<String>,
}

/// Precondition as written in YAML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreconditionConfig {
    PathExists(String),
    DirExists(String),
    FileExists(String),
    CommandAvailable(String),
    All(Vec<PreconditionConfig>),
}

/// What happens to the run when a step's action fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the run immediately
    #[default]
    Abort,
    /// Log a warning and carry on with the next step
    Warn,
}

impl ProvisionConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", path.display(), e))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ProvisionConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            anyhow::bail!("Configuration '{}' has no steps", self.name);
        }
        if self.defaults.timeout_secs == Some(0) {
            anyhow::bail!("Configuration '{}' has a zero default timeout", self.name);
        }

        let mut seen_ids = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                anyhow::bail!("Step '{}' has an empty id", step.name);
            }
            if !seen_ids.insert(&step.id) {
                anyhow::bail!("Duplicate step ID: {}", step.id);
            }

            if let Some(retries) = step.retries.or(self.defaults.retries) {
                if retries > MAX_RETRIES {
                    anyhow::bail!(
                        "Step '{}' asks for {} retries (maximum is {})",
                        step.id,
                        retries,
                        MAX_RETRIES
                    );
                }
            }

            if step.timeout_secs == Some(0) {
                anyhow::bail!("Step '{}' has a zero timeout", step.id);
            }

            self.validate_action(step)?;
        }

        Ok(())
    }

    fn validate_action(&self, step: &StepConfig) -> Result<()> {
        match &step.action {
            Action::InstallTool { source, .. } => {
                if let ToolSource::Artifact { sha256, .. } = source {
                    let valid = sha256.len() == 64 && sha256.chars().all(|c| c.is_ascii_hexdigit());
                    if !valid {
                        anyhow::bail!(
                            "Step '{}' fetches an installer without a pinned SHA-256 digest",
                            step.id
                        );
                    }
                }
            }
            Action::Template { builtin, source, content, .. } => {
                let given = [builtin.is_some(), source.is_some(), content.is_some()]
                    .iter()
                    .filter(|set| **set)
                    .count();
                if given != 1 {
                    anyhow::bail!(
                        "Step '{}' must set exactly one of builtin, source or content",
                        step.id
                    );
                }
                if let Some(name) = builtin {
                    if crate::template::builtin::lookup(name).is_none() {
                        anyhow::bail!("Step '{}' references unknown builtin template '{}'", step.id, name);
                    }
                }
            }
            Action::PatchScript { preset, repo_dir, rules, .. } => {
                if preset.is_none() && rules.is_empty() {
                    anyhow::bail!("Step '{}' patches a script without any rules", step.id);
                }
                if preset.is_some() && repo_dir.is_none() {
                    anyhow::bail!("Step '{}' uses a rule preset but sets no repo_dir", step.id);
                }
                for rule in rules {
                    RewriteRule::compile(rule)
                        .map_err(|e| anyhow::anyhow!("Step '{}' has an invalid rule: {}", step.id, e))?;
                }
            }
            Action::Packages { packages, .. } if packages.is_empty() => {
                anyhow::bail!("Step '{}' installs an empty package list", step.id);
            }
            _ => {}
        }

        Ok(())
    }

    /// Apply `key=value` overrides on top of the configured variables
    pub fn override_variables(&mut self, overrides: &[(String, String)]) {
        for (key, value) in overrides {
            self.variables.insert(key.clone(), value.clone());
        }
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Pipeline {
        Pipeline::from_config(self)
    }
}
