//! Script patcher - ordered textual rewrite rules over an existing script
//!
//! Rules are applied one after another over the whole text, so a later rule
//! sees (and may match) text produced by an earlier one. Every rule works on
//! whole tokens or whole lines and is checked at compile time so it cannot
//! unbalance the script's quoting.

use regex::{Captures, NoExpand, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::template::render_placeholders;

/// Errors raised while building rules or patching a script
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Script to patch not found: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("Cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing to patch {} in place; write the result to a different file", .0.display())]
    InPlace(PathBuf),

    #[error("Invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Literal rule has an empty pattern")]
    EmptyPattern,

    #[error("Rule text must stay on a single line: `{0}`")]
    Multiline(String),

    #[error("Rule would change the script's quoting: `{from}` -> `{to}`")]
    UnbalancedQuotes { from: String, to: String },

    #[error("Renumber pattern `{0}` needs a named group `n` around the number")]
    MissingOrdinalGroup(String),
}

/// Rewrite rule as written in YAML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleConfig {
    /// Replace a literal token sequence
    Literal { from: String, to: String },
    /// Replace a regular expression (multi-line mode, `$n` expansion)
    Regex { pattern: String, replacement: String },
    /// Shift the number captured by the group `n` by `offset`
    Renumber {
        pattern: String,
        #[serde(default = "default_offset")]
        offset: i64,
    },
    /// Insert `line` right after the first line containing `anchor`
    InsertAfter { anchor: String, line: String },
}

fn default_offset() -> i64 {
    1
}

impl RuleConfig {
    /// Substitute `{{ name }}` placeholders in every text field
    pub fn render(&self, vars: &BTreeMap<String, String>) -> RuleConfig {
        let r = |s: &String| render_placeholders(s, vars);
        match self {
            RuleConfig::Literal { from, to } => RuleConfig::Literal { from: r(from), to: r(to) },
            RuleConfig::Regex { pattern, replacement } => RuleConfig::Regex {
                pattern: r(pattern),
                replacement: r(replacement),
            },
            RuleConfig::Renumber { pattern, offset } => RuleConfig::Renumber {
                pattern: r(pattern),
                offset: *offset,
            },
            RuleConfig::InsertAfter { anchor, line } => RuleConfig::InsertAfter {
                anchor: r(anchor),
                line: r(line),
            },
        }
    }
}

/// A compiled rewrite rule
#[derive(Debug, Clone)]
pub enum RewriteRule {
    Replace {
        regex: Regex,
        replacement: String,
        literal: bool,
    },
    Renumber {
        regex: Regex,
        offset: i64,
    },
    InsertAfter {
        anchor: String,
        line: String,
    },
}

impl RewriteRule {
    /// Replace `from` with `to` wherever it appears as a whole token
    pub fn literal(from: &str, to: &str) -> Result<Self, PatchError> {
        if from.is_empty() {
            return Err(PatchError::EmptyPattern);
        }
        single_line(from)?;
        single_line(to)?;
        if quote_counts(from) != quote_counts(to) {
            return Err(PatchError::UnbalancedQuotes {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let boundary = |c: Option<char>| match c {
            Some(c) if is_word_char(c) => r"\b",
            _ => "",
        };
        let pattern = format!(
            "{}{}{}",
            boundary(from.chars().next()),
            regex::escape(from),
            boundary(from.chars().last())
        );

        Ok(RewriteRule::Replace {
            regex: compile(&pattern)?,
            replacement: to.to_string(),
            literal: true,
        })
    }

    /// Replace every match of `pattern`; `replacement` may use `$1`/`${name}`
    pub fn regex(pattern: &str, replacement: &str) -> Result<Self, PatchError> {
        single_line(replacement)?;
        Ok(RewriteRule::Replace {
            regex: compile(pattern)?,
            replacement: replacement.to_string(),
            literal: false,
        })
    }

    /// Add `offset` to the ordinal captured as `(?P<n>\d+)` in each match
    pub fn renumber(pattern: &str, offset: i64) -> Result<Self, PatchError> {
        let regex = compile(pattern)?;
        if !regex.capture_names().any(|name| name == Some("n")) {
            return Err(PatchError::MissingOrdinalGroup(pattern.to_string()));
        }
        Ok(RewriteRule::Renumber { regex, offset })
    }

    /// Insert `line` after the first line that contains `anchor`
    pub fn insert_after(anchor: &str, line: &str) -> Result<Self, PatchError> {
        if anchor.is_empty() {
            return Err(PatchError::EmptyPattern);
        }
        single_line(anchor)?;
        single_line(line)?;
        let (double, _) = quote_counts(line);
        if double % 2 != 0 {
            return Err(PatchError::UnbalancedQuotes {
                from: anchor.to_string(),
                to: line.to_string(),
            });
        }
        Ok(RewriteRule::InsertAfter {
            anchor: anchor.to_string(),
            line: line.to_string(),
        })
    }

    /// Compile a rule from its YAML form
    pub fn compile(config: &RuleConfig) -> Result<Self, PatchError> {
        match config {
            RuleConfig::Literal { from, to } => Self::literal(from, to),
            RuleConfig::Regex { pattern, replacement } => Self::regex(pattern, replacement),
            RuleConfig::Renumber { pattern, offset } => Self::renumber(pattern, *offset),
            RuleConfig::InsertAfter { anchor, line } => Self::insert_after(anchor, line),
        }
    }

    /// Apply the rule, returning the new text and whether anything matched
    pub fn apply(&self, text: &str) -> (String, bool) {
        match self {
            RewriteRule::Replace {
                regex,
                replacement,
                literal,
            } => {
                if !regex.is_match(text) {
                    return (text.to_string(), false);
                }
                let rewritten = if *literal {
                    regex.replace_all(text, NoExpand(replacement))
                } else {
                    regex.replace_all(text, replacement.as_str())
                };
                (rewritten.into_owned(), true)
            }
            RewriteRule::Renumber { regex, offset } => {
                if !regex.is_match(text) {
                    return (text.to_string(), false);
                }
                let rewritten = regex.replace_all(text, |caps: &Captures| shift_ordinal(caps, *offset));
                (rewritten.into_owned(), true)
            }
            RewriteRule::InsertAfter { anchor, line } => insert_after_anchor(text, anchor, line),
        }
    }
}

/// Result of patching a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    /// The fully rewritten text
    pub text: String,

    /// Indexes of rules that matched nothing
    pub unmatched: Vec<usize>,
}

/// Apply `rules` in order to `text`
pub fn patch_text(text: &str, rules: &[RewriteRule]) -> PatchReport {
    let mut unmatched = Vec::new();
    let text = rules
        .iter()
        .enumerate()
        .fold(text.to_string(), |acc, (index, rule)| {
            let (next, matched) = rule.apply(&acc);
            if !matched {
                debug!("Rewrite rule {} matched nothing", index);
                unmatched.push(index);
            }
            next
        });

    PatchReport { text, unmatched }
}

/// Read the script at `source` and apply `rules` in order
///
/// A missing source fails before any rule runs; a rule that matches
/// nothing is reported but is not an error.
pub fn patch(source: &Path, rules: &[RewriteRule]) -> Result<PatchReport, PatchError> {
    if !source.is_file() {
        return Err(PatchError::SourceMissing(source.to_path_buf()));
    }

    let text = std::fs::read_to_string(source).map_err(|e| PatchError::Read {
        path: source.to_path_buf(),
        source: e,
    })?;

    Ok(patch_text(&text, rules))
}

fn compile(pattern: &str) -> Result<Regex, PatchError> {
    Regex::new(&format!("(?m){}", pattern)).map_err(|e| PatchError::InvalidPattern {
        pattern: pattern.to_string(),
        source: e,
    })
}

fn single_line(text: &str) -> Result<(), PatchError> {
    if text.contains('\n') {
        return Err(PatchError::Multiline(text.to_string()));
    }
    Ok(())
}

fn quote_counts(text: &str) -> (usize, usize) {
    (
        text.chars().filter(|c| *c == '"').count(),
        text.chars().filter(|c| *c == '\'').count(),
    )
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn shift_ordinal(caps: &Captures, offset: i64) -> String {
    let whole = &caps[0];
    let (Some(full), Some(ordinal)) = (caps.get(0), caps.name("n")) else {
        return whole.to_string();
    };
    let Some(value) = ordinal
        .as_str()
        .parse::<i64>()
        .ok()
        .and_then(|value| value.checked_add(offset))
    else {
        return whole.to_string();
    };

    let start = ordinal.start() - full.start();
    let end = ordinal.end() - full.start();
    format!("{}{}{}", &whole[..start], value, &whole[end..])
}

fn insert_after_anchor(text: &str, anchor: &str, line: &str) -> (String, bool) {
    let mut output = String::with_capacity(text.len() + line.len() + 1);
    let mut inserted = false;

    for current in text.split_inclusive('\n') {
        output.push_str(current);
        if !inserted && current.contains(anchor) {
            if !current.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(line);
            output.push('\n');
            inserted = true;
        }
    }

    (output, inserted)
}
