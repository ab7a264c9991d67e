//! Test: Fail Fast - the first hard failure stops the run

use crate::helpers::*;
use provision::execution::ExecutionEvent;

const YAML: &str = r##"
name: "Test: Fail Fast"
variables:
  repo_dir: "LFG-S"
steps:
  - id: "packages"
    name: "Install system packages"
    action: { type: packages, packages: [git, python3] }
  - id: "clone"
    name: "Clone repository"
    action: { type: git_sync, url: "https://example.org/lab/LFG-S.git", dest: "{{ repo_dir }}" }
  - id: "venv"
    name: "Create virtual environment"
    action: { type: venv, path: "{{ repo_dir }}/venv" }
  - id: "context"
    name: "Write project context"
    action: { type: template, path: "CONTEXT.md", content: "# {{ repo_dir }}" }
"##;

#[tokio::test]
async fn test_failing_step_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = scratch_context(dir.path());
    let mut pipeline = pipeline_from_yaml(YAML);

    let runner = MockRunner::new().fail("git clone", 128, "fatal: repository not found");
    let calls = runner.calls();
    let result = run_with_mock(&mut pipeline, &mut ctx, runner).await;

    assert_pipeline_failed(&result);
    assert_step_completed(&result, "packages");
    assert_step_failed(&result, "clone", "repository not found");
    assert_step_pending(&result, "venv");
    assert_step_pending(&result, "context");
    assert_execution_order(&result, &["packages", "clone"]);

    assert_eq!(result.pipeline.state.failed_step.as_deref(), Some("clone"));
    let error = result.error.as_deref().unwrap();
    assert!(error.contains("Clone repository"), "error should name the step: {}", error);

    // Nothing after the failing step ran
    assert!(!command_lines(&calls).iter().any(|line| line.contains("venv")));
    assert!(!ctx.workdir.join("CONTEXT.md").exists());
}

#[tokio::test]
async fn test_failure_event_is_last_step_event() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = scratch_context(dir.path());
    let mut pipeline = pipeline_from_yaml(YAML);

    let runner = MockRunner::new().fail("apt-get install", 100, "E: Unable to locate package");
    let result = run_with_mock(&mut pipeline, &mut ctx, runner).await;

    let started: Vec<&str> = result
        .events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::StepStarted { step_id, .. } => Some(step_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec!["packages"]);
    assert!(matches!(
        result.events.last(),
        Some(ExecutionEvent::PipelineCompleted { .. })
    ));
}

#[tokio::test]
async fn test_warn_policy_keeps_going() {
    let yaml = r#"
name: "Test: Warn Policy"
steps:
  - id: "optional"
    name: "Optional tooling"
    action: { type: command, program: "fetch-extras" }
    on_failure: warn
  - id: "context"
    name: "Write project context"
    action: { type: template, path: "CONTEXT.md", content: "done" }
"#;
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = scratch_context(dir.path());
    let mut pipeline = pipeline_from_yaml(yaml);

    let runner = MockRunner::new().fail("fetch-extras", 2, "mirror unavailable");
    let result = run_with_mock(&mut pipeline, &mut ctx, runner).await;

    assert_pipeline_completed(&result);
    assert_step_warned(&result, "optional", "mirror unavailable");
    assert_step_completed(&result, "context");
    assert_eq!(result.pipeline.state.warned_steps, 1);
    assert_eq!(
        std::fs::read_to_string(ctx.workdir.join("CONTEXT.md")).unwrap(),
        "done"
    );
}
