//! Test: Retry Behavior - per-step retry budgets

use crate::helpers::*;
use provision::core::StepState;
use provision::execution::ExecutionEvent;

#[tokio::test]
async fn test_flaky_install_recovers_within_budget() {
    let yaml = r#"
name: "Test: Flaky Mirror"
steps:
  - id: "packages"
    name: "Install system packages"
    action: { type: packages, packages: [git], update: false }
    retries: 2
"#;
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = scratch_context(dir.path());
    let mut pipeline = pipeline_from_yaml(yaml);

    let runner = MockRunner::new().fail_times("apt-get install", 2, "Temporary failure resolving");
    let calls = runner.calls();
    let result = run_with_mock(&mut pipeline, &mut ctx, runner).await;

    assert_pipeline_completed(&result);
    match result.step_state("packages") {
        StepState::Completed { attempts, .. } => assert_eq!(*attempts, 3),
        other => panic!("unexpected state {:?}", other),
    }
    assert_eq!(calls.lock().unwrap().len(), 3);

    let retries: Vec<usize> = result
        .events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::StepRetrying { attempt, max_attempts, .. } => {
                assert_eq!(*max_attempts, 3);
                Some(*attempt)
            }
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![2, 3]);
}

#[tokio::test]
async fn test_budget_exhausted_fails_step() {
    let yaml = r#"
name: "Test: Broken Mirror"
defaults:
  retries: 1
steps:
  - id: "packages"
    name: "Install system packages"
    action: { type: packages, packages: [git], update: false }
"#;
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = scratch_context(dir.path());
    let mut pipeline = pipeline_from_yaml(yaml);

    let runner = MockRunner::new().fail("apt-get install", 100, "E: Unable to locate package git");
    let calls = runner.calls();
    let result = run_with_mock(&mut pipeline, &mut ctx, runner).await;

    assert_pipeline_failed(&result);
    assert_step_failed(&result, "packages", "Unable to locate package");
    match result.step_state("packages") {
        StepState::Failed { attempts, .. } => assert_eq!(*attempts, 2),
        other => panic!("unexpected state {:?}", other),
    }
    assert_eq!(calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_missing_secret_is_not_retried() {
    let yaml = r#"
name: "Test: Operator Error"
steps:
  - id: "git-auth"
    name: "Configure Git authentication"
    action: { type: git_auth, token_file: "~/.github_token", repo_dir: "LFG-S", url: "https://github.com/lab/LFG-S.git" }
    retries: 3
"#;
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = scratch_context(dir.path());
    let mut pipeline = pipeline_from_yaml(yaml);

    let result = run_with_mock(&mut pipeline, &mut ctx, MockRunner::new()).await;

    match result.step_state("git-auth") {
        StepState::Failed { attempts, .. } => assert_eq!(*attempts, 1),
        other => panic!("unexpected state {:?}", other),
    }
    assert!(!result
        .events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::StepRetrying { .. })));
}
