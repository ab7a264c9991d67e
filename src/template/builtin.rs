//! Bundled templates and rule presets

use crate::template::RuleConfig;
use serde::{Deserialize, Serialize};

const CONTEXT: &str = include_str!("../../templates/context.md");
const SETUP_AUTH: &str = include_str!("../../templates/setup_auth.sh");
const QUICK_REFERENCE: &str = include_str!("../../templates/quick_reference.sh");
const VALIDATE_SETUP: &str = include_str!("../../templates/validate_setup.sh");

/// Names of every bundled template
pub const NAMES: &[&str] = &["context", "setup_auth", "quick_reference", "validate_setup"];

/// Look up a bundled template by name
pub fn lookup(name: &str) -> Option<&'static str> {
    match name {
        "context" => Some(CONTEXT),
        "setup_auth" => Some(SETUP_AUTH),
        "quick_reference" => Some(QUICK_REFERENCE),
        "validate_setup" => Some(VALIDATE_SETUP),
        _ => None,
    }
}

/// Named rule sets for scripts the pipeline does not author itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePreset {
    /// Adapt a repository's validation script to run from the parent directory
    Validation,
}

impl RulePreset {
    pub fn rules(&self, repo_dir: &str) -> Vec<RuleConfig> {
        match self {
            RulePreset::Validation => validation_rules(repo_dir),
        }
    }
}

/// Rules that re-root a repository script one directory up
///
/// A relative path is recognised at the start of a line, after a quote,
/// whitespace, `=` or `(`, and behind `./`.
///
/// Order matters: the ordinal shift must run before the new first step is
/// inserted, otherwise the inserted line would be renumbered too.
pub fn validation_rules(repo_dir: &str) -> Vec<RuleConfig> {
    let repo = repo_dir.trim_end_matches('/');
    let escaped = repo.replace('$', "$$");

    vec![
        RuleConfig::Regex {
            pattern: r#"(^|["\s=(]|\./)(venv|data|src|scripts|results)/"#.to_string(),
            replacement: format!("${{1}}{}/${{2}}/", escaped),
        },
        RuleConfig::Regex {
            pattern: r#"(^|["\s=(]|\./)(requirements\.txt|setup\.py)"#.to_string(),
            replacement: format!("${{1}}{}/${{2}}", escaped),
        },
        RuleConfig::Renumber {
            pattern: r#"^(\s*echo\s+"\s*)(?P<n>\d+)\."#.to_string(),
            offset: 1,
        },
        RuleConfig::InsertAfter {
            anchor: "Next steps:".to_string(),
            line: format!(
                "echo \"  1. Run the commands below from the directory containing {}/\"",
                repo
            ),
        },
    ]
}
