//! Step preconditions - probes deciding whether a step's work is already done

use crate::action::tool::resolve_command;
use crate::core::config::PreconditionConfig;
use crate::core::context::ProvisionContext;

/// A precondition that, when it holds, lets a step skip its action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    PathExists(String),
    DirExists(String),
    FileExists(String),
    /// A command resolves in a recorded tool directory or on `PATH`
    CommandAvailable(String),
    /// The step's stored version stamp equals `value`
    StampMatches { step_id: String, value: String },
    /// Every inner precondition holds
    All(Vec<Precondition>),
}

impl Precondition {
    pub fn from_config(config: &PreconditionConfig) -> Self {
        match config {
            PreconditionConfig::PathExists(path) => Precondition::PathExists(path.clone()),
            PreconditionConfig::DirExists(path) => Precondition::DirExists(path.clone()),
            PreconditionConfig::FileExists(path) => Precondition::FileExists(path.clone()),
            PreconditionConfig::CommandAvailable(name) => {
                Precondition::CommandAvailable(name.clone())
            }
            PreconditionConfig::All(inner) => {
                Precondition::All(inner.iter().map(Precondition::from_config).collect())
            }
        }
    }

    /// Evaluate against the context, returning why it holds
    ///
    /// Paths are rendered at check time so they see tools recorded by
    /// earlier steps.
    pub fn satisfied(&self, ctx: &ProvisionContext) -> Option<String> {
        match self {
            Precondition::PathExists(raw) => {
                let path = ctx.resolve_path(raw);
                path.exists().then(|| format!("{} exists", path.display()))
            }
            Precondition::DirExists(raw) => {
                let path = ctx.resolve_path(raw);
                path.is_dir()
                    .then(|| format!("directory {} exists", path.display()))
            }
            Precondition::FileExists(raw) => {
                let path = ctx.resolve_path(raw);
                path.is_file()
                    .then(|| format!("file {} exists", path.display()))
            }
            Precondition::CommandAvailable(raw) => {
                let name = ctx.render(raw);
                resolve_command(&name, &ctx.tool_dirs())
                    .map(|path| format!("`{}` is available at {}", name, path.display()))
            }
            Precondition::StampMatches { step_id, value } => {
                let stored = ctx.read_stamp(step_id)?;
                (stored == *value).then(|| format!("stamp {} is current", value))
            }
            Precondition::All(inner) => {
                let reasons = inner
                    .iter()
                    .map(|p| p.satisfied(ctx))
                    .collect::<Option<Vec<_>>>()?;
                Some(reasons.join(", "))
            }
        }
    }

    /// Short description for plans
    pub fn describe(&self) -> String {
        match self {
            Precondition::PathExists(p) => format!("path {} exists", p),
            Precondition::DirExists(p) => format!("directory {} exists", p),
            Precondition::FileExists(p) => format!("file {} exists", p),
            Precondition::CommandAvailable(c) => format!("`{}` is available", c),
            Precondition::StampMatches { value, .. } => format!("stamp is {}", value),
            Precondition::All(inner) => inner
                .iter()
                .map(Precondition::describe)
                .collect::<Vec<_>>()
                .join(" and "),
        }
    }
}
