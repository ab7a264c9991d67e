//! Text generation: placeholder rendering, file emission and script patching

pub mod builtin;
pub mod emitter;
pub mod patcher;

pub use emitter::{emit, write_script};
pub use patcher::{patch, patch_text, PatchError, PatchReport, RewriteRule, RuleConfig};

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::OnceLock;

static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();

/// Replace placeholders of the form `{{ name }}` with their values
///
/// Substitution is literal and single-pass: values are not escaped, a value
/// containing `{{ other }}` is not expanded again, and unknown placeholders
/// are left untouched.
pub fn render_placeholders(template: &str, variables: &BTreeMap<String, String>) -> String {
    let placeholder = PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{\{ ([^{}\s]+) \}\}").expect("placeholder pattern is valid"));

    placeholder
        .replace_all(template, |caps: &Captures| match variables.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
