//! Test: Token Permissions - git authentication from a secret file

use crate::helpers::*;

const YAML: &str = r#"
name: "Test: Git Auth"
steps:
  - id: "git-auth"
    name: "Configure Git authentication"
    action:
      type: git_auth
      token_file: "~/.github_token"
      repo_dir: "LFG-S"
      url: "https://github.com/lab/LFG-S.git"
"#;

const TOKEN: &str = "ghp_secretvalue123";

fn prepare(root: &std::path::Path, token: Option<&str>) -> provision::core::ProvisionContext {
    let ctx = scratch_context(root);
    std::fs::create_dir_all(ctx.workdir.join("LFG-S/.git")).unwrap();
    if let Some(token) = token {
        std::fs::write(ctx.home.join(".github_token"), format!("{}\n", token)).unwrap();
    }
    ctx
}

#[tokio::test]
async fn test_token_never_appears_in_commands_or_errors() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = prepare(dir.path(), Some(TOKEN));
    let mut pipeline = pipeline_from_yaml(YAML);

    let runner = MockRunner::new();
    let calls = runner.calls();
    let result = run_with_mock(&mut pipeline, &mut ctx, runner).await;

    assert_pipeline_completed(&result);
    assert_step_completed(&result, "git-auth");

    let recorded = calls.lock().unwrap().clone();
    assert_eq!(recorded.len(), 2);
    // The real command carries the token, its displayed form never does
    assert!(recorded[0].args.iter().any(|a| a == &format!("https://{}@github.com/lab/LFG-S.git", TOKEN)));
    for line in command_lines(&calls) {
        assert!(!line.contains(TOKEN), "token leaked into {}", line);
    }
    assert_eq!(recorded[1].env.get("GIT_TERMINAL_PROMPT").map(String::as_str), Some("0"));
    assert!(recorded[1].args.contains(&"ls-remote".to_string()));
}

#[cfg(unix)]
#[tokio::test]
async fn test_loose_permissions_are_tightened() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let mut ctx = prepare(dir.path(), Some(TOKEN));
    let token_path = ctx.home.join(".github_token");
    std::fs::set_permissions(&token_path, std::fs::Permissions::from_mode(0o644)).unwrap();

    let mut pipeline = pipeline_from_yaml(YAML);
    let result = run_with_mock(&mut pipeline, &mut ctx, MockRunner::new()).await;

    assert_pipeline_completed(&result);
    let mode = std::fs::metadata(&token_path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[tokio::test]
async fn test_missing_token_explains_how_to_create_it() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = prepare(dir.path(), None);
    let mut pipeline = pipeline_from_yaml(YAML);

    let runner = MockRunner::new();
    let calls = runner.calls();
    let result = run_with_mock(&mut pipeline, &mut ctx, runner).await;

    assert_pipeline_failed(&result);
    assert_step_failed(&result, "git-auth", "chmod 600");
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_token_counts_as_missing() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = prepare(dir.path(), Some("   "));
    let mut pipeline = pipeline_from_yaml(YAML);

    let result = run_with_mock(&mut pipeline, &mut ctx, MockRunner::new()).await;

    assert_step_failed(&result, "git-auth", "not found");
}

#[tokio::test]
async fn test_probe_failure_fails_step_without_leaking() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = prepare(dir.path(), Some(TOKEN));
    let mut pipeline = pipeline_from_yaml(YAML);

    let runner = MockRunner::new().fail("ls-remote", 128, "remote: Invalid username or password.");
    let result = run_with_mock(&mut pipeline, &mut ctx, runner).await;

    assert_pipeline_failed(&result);
    assert_step_failed(&result, "git-auth", "Connectivity probe");
    assert!(!result.error.as_deref().unwrap().contains(TOKEN));
}
