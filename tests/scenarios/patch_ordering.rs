//! Test: Patch Ordering - rules apply in sequence over the whole script

use crate::helpers::*;
use provision::template::builtin::validation_rules;
use provision::template::{patch_text, RewriteRule, RuleConfig};

fn compile(configs: &[RuleConfig]) -> Vec<RewriteRule> {
    configs.iter().map(|c| RewriteRule::compile(c).unwrap()).collect()
}

#[test]
fn test_rule_order_changes_result() {
    let path_rule = RuleConfig::Literal {
        from: "setup.sh".to_string(),
        to: "LFG-S/setup.sh".to_string(),
    };
    let label_rule = RuleConfig::Literal {
        from: "Run setup.sh".to_string(),
        to: "Run the installer".to_string(),
    };
    let script = "echo \"Run setup.sh\"\n";

    let path_first = patch_text(script, &compile(&[path_rule.clone(), label_rule.clone()]));
    let label_first = patch_text(script, &compile(&[label_rule, path_rule]));

    assert_eq!(path_first.text, "echo \"Run LFG-S/setup.sh\"\n");
    assert_eq!(path_first.unmatched, vec![1]);
    assert_eq!(label_first.text, "echo \"Run the installer\"\n");
    assert_eq!(label_first.unmatched, vec![1]);
}

#[test]
fn test_later_rule_sees_earlier_output() {
    let rules = compile(&[
        RuleConfig::Literal {
            from: "data/".to_string(),
            to: "LFG-S/data/".to_string(),
        },
        RuleConfig::Regex {
            pattern: r"LFG-S/(\w+)/".to_string(),
            replacement: "$${REPO}/$1/".to_string(),
        },
    ]);

    let report = patch_text("ls data/kernels\n", &rules);
    assert_eq!(report.text, "ls ${REPO}/data/kernels\n");
    assert!(report.unmatched.is_empty());
}

const FIXTURE: &str = r#"#!/bin/bash
if [ -f ".github_token" ]; then
    echo "token found"
fi
source venv/bin/activate
pip check -r requirements.txt
PYTHON=venv/bin/python
$PYTHON ./scripts/check_env.py
if [ -d "data/kernels" ]; then
    echo "kernels present"
fi
echo "Next steps:"
echo "  1. source venv/bin/activate"
echo "  2. python scripts/run.py"
"#;

const EXPECTED: &str = r#"#!/bin/bash
if [ -f ".github_token" ]; then
    echo "token found"
fi
source LFG-S/venv/bin/activate
pip check -r LFG-S/requirements.txt
PYTHON=LFG-S/venv/bin/python
$PYTHON ./LFG-S/scripts/check_env.py
if [ -d "LFG-S/data/kernels" ]; then
    echo "kernels present"
fi
echo "Next steps:"
echo "  1. Run the commands below from the directory containing LFG-S/"
echo "  2. source LFG-S/venv/bin/activate"
echo "  3. python LFG-S/scripts/run.py"
"#;

#[test]
fn test_validation_preset_fixture() {
    let report = patch_text(FIXTURE, &compile(&validation_rules("LFG-S")));
    assert_eq!(report.text, EXPECTED);
}

#[tokio::test]
async fn test_patch_step_writes_executable_copy() {
    let yaml = r#"
name: "Test: Patch Step"
variables:
  repo_dir: "LFG-S"
steps:
  - id: "validate-setup"
    name: "Create validation script"
    action:
      type: patch_script
      source: "{{ repo_dir }}/validate_setup.sh"
      dest: "validate_setup.sh"
      preset: validation
      repo_dir: "{{ repo_dir }}"
"#;
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = scratch_context(dir.path());
    let source = ctx.workdir.join("LFG-S/validate_setup.sh");
    std::fs::create_dir_all(source.parent().unwrap()).unwrap();
    std::fs::write(&source, FIXTURE).unwrap();

    let mut pipeline = pipeline_from_yaml(yaml);
    let result = run_with_mock(&mut pipeline, &mut ctx, MockRunner::new()).await;

    assert_pipeline_completed(&result);
    let dest = ctx.workdir.join("validate_setup.sh");
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), EXPECTED);
    // The repository copy is left untouched
    assert_eq!(std::fs::read_to_string(&source).unwrap(), FIXTURE);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    // Re-running patches the pristine source again rather than the output
    let mut pipeline = pipeline_from_yaml(yaml);
    run_with_mock(&mut pipeline, &mut ctx, MockRunner::new()).await;
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), EXPECTED);
}

#[tokio::test]
async fn test_missing_source_fails_the_step() {
    let yaml = r#"
name: "Test: Missing Source"
steps:
  - id: "validate-setup"
    name: "Create validation script"
    action:
      type: patch_script
      source: "LFG-S/validate_setup.sh"
      dest: "validate_setup.sh"
      preset: validation
      repo_dir: "LFG-S"
"#;
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = scratch_context(dir.path());
    let mut pipeline = pipeline_from_yaml(yaml);

    let result = run_with_mock(&mut pipeline, &mut ctx, MockRunner::new()).await;

    assert_pipeline_failed(&result);
    assert_step_failed(&result, "validate-setup", "not found");
    assert!(!ctx.workdir.join("validate_setup.sh").exists());
}
