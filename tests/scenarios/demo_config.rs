//! Test: Demo Config - the bundled LFG-S configuration loads and plans cleanly

use crate::helpers::*;
use provision::action::Action;
use provision::core::config::{FailurePolicy, ProvisionConfig};

fn demo() -> ProvisionConfig {
    ProvisionConfig::from_file(concat!(env!("CARGO_MANIFEST_DIR"), "/demos/lfg-s.yaml"))
        .expect("demo configuration should be valid")
}

#[test]
fn test_demo_step_order() {
    let pipeline = demo().to_pipeline();
    assert_eq!(
        pipeline.execution_order(),
        vec![
            "packages",
            "uv",
            "clone",
            "venv",
            "deps",
            "context",
            "setup-auth",
            "quick-reference",
            "validate-setup",
            "git-auth",
        ]
    );
}

#[test]
fn test_demo_patches_after_clone_and_authenticates_last() {
    let config = demo();
    let patch = config.steps.iter().find(|s| s.id == "validate-setup").unwrap();
    assert_eq!(patch.on_failure, FailurePolicy::Abort);
    assert!(matches!(patch.action, Action::PatchScript { preset: Some(_), .. }));

    let last = config.steps.last().unwrap();
    assert!(matches!(last.action, Action::GitAuth { .. }));
}

/// Lay out a cloned checkout with a venv and an installed `uv`
#[cfg(unix)]
fn prepared_context(root: &std::path::Path, with_validation_script: bool) -> provision::core::ProvisionContext {
    use std::os::unix::fs::PermissionsExt;

    let ctx = scratch_context(root);
    let repo = ctx.workdir.join("LFG-S");
    std::fs::create_dir_all(repo.join(".git")).unwrap();
    std::fs::create_dir_all(repo.join("venv/bin")).unwrap();
    std::fs::write(repo.join("venv/bin/pip"), "").unwrap();
    std::fs::write(repo.join("requirements.txt"), "numpy\n").unwrap();
    if with_validation_script {
        std::fs::write(
            repo.join("validate_setup.sh"),
            "#!/bin/bash\nsource venv/bin/activate\necho \"Next steps:\"\necho \"  1. python scripts/run.py\"\n",
        )
        .unwrap();
    }
    std::fs::write(ctx.home.join(".github_token"), "ghp_token\n").unwrap();
    let uv = ctx.home.join(".local/bin/uv");
    std::fs::create_dir_all(uv.parent().unwrap()).unwrap();
    std::fs::write(&uv, "").unwrap();
    std::fs::set_permissions(&uv, std::fs::Permissions::from_mode(0o755)).unwrap();
    ctx
}

#[cfg(unix)]
#[tokio::test]
async fn test_demo_runs_against_scripted_commands() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = prepared_context(dir.path(), true);

    let mut pipeline = demo().to_pipeline();
    let runner = MockRunner::new();
    let calls = runner.calls();
    let result = run_with_mock(&mut pipeline, &mut ctx, runner).await;

    assert_pipeline_completed(&result);
    assert_step_completed(&result, "clone");
    assert_step_completed(&result, "git-auth");
    assert!(ctx.workdir.join("CONTEXT.md").is_file());
    assert!(ctx.workdir.join("setup_auth.sh").is_file());

    let validate = std::fs::read_to_string(ctx.workdir.join("validate_setup.sh")).unwrap();
    assert!(validate.contains("source LFG-S/venv/bin/activate"));
    assert!(validate.contains("2. python LFG-S/scripts/run.py"));

    let lines = command_lines(&calls);
    assert!(lines.iter().any(|l| l.contains("pull --ff-only")));
    assert!(lines.iter().any(|l| l.contains("install -r")));
    assert!(!lines.iter().any(|l| l.contains("ghp_token")));
}

#[cfg(unix)]
#[tokio::test]
async fn test_demo_stops_when_validation_script_is_missing() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = prepared_context(dir.path(), false);

    let mut pipeline = demo().to_pipeline();
    let result = run_with_mock(&mut pipeline, &mut ctx, MockRunner::new()).await;

    assert_pipeline_failed(&result);
    assert_step_failed(&result, "validate-setup", "validate_setup.sh");
    assert_step_pending(&result, "git-auth");
    assert!(!ctx.workdir.join("validate_setup.sh").exists());
}
