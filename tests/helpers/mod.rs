//! Test utilities for provisioning scenarios

#![allow(dead_code)]

use async_trait::async_trait;
use provision::action::{ActionError, ArtifactFetcher, CommandOutput, CommandRunner, CommandSpec};
use provision::core::config::ProvisionConfig;
use provision::core::{ExecutionStatus, Pipeline, ProvisionContext, StepState};
use provision::execution::{ExecutionEngine, ExecutionEvent, StepExecutor};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A scripted response for commands whose line contains `pattern`
struct Script {
    pattern: String,
    output: CommandOutput,
    /// How many more times the response applies (`None` = always)
    remaining: Option<AtomicUsize>,
    /// Time the command hangs before answering
    delay: Duration,
}

/// Shared record of every command a [`MockRunner`] was asked to run
pub type CallLog = Arc<Mutex<Vec<CommandSpec>>>;

/// Command runner that records invocations and returns scripted results
///
/// Commands without a matching script succeed with empty output. Scripts
/// are matched in the order they were added, against the displayed
/// (redacted) command line.
pub struct MockRunner {
    scripts: Vec<Script>,
    calls: CallLog,
}

impl MockRunner {
    pub fn new() -> Self {
        Self {
            scripts: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Matching commands print `stdout` and succeed
    pub fn respond(mut self, pattern: &str, stdout: &str) -> Self {
        self.scripts.push(Script {
            pattern: pattern.to_string(),
            output: CommandOutput {
                code: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
            remaining: None,
            delay: Duration::ZERO,
        });
        self
    }

    /// Matching commands hang for `delay` before succeeding
    pub fn stall(mut self, pattern: &str, delay: Duration) -> Self {
        self.scripts.push(Script {
            pattern: pattern.to_string(),
            output: CommandOutput {
                code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            },
            remaining: None,
            delay,
        });
        self
    }

    /// Matching commands always exit with `code`
    pub fn fail(mut self, pattern: &str, code: i32, stderr: &str) -> Self {
        self.scripts.push(Self::failure(pattern, code, stderr, None));
        self
    }

    /// Matching commands fail `times` times, then fall through to later scripts
    pub fn fail_times(mut self, pattern: &str, times: usize, stderr: &str) -> Self {
        self.scripts
            .push(Self::failure(pattern, 1, stderr, Some(AtomicUsize::new(times))));
        self
    }

    fn failure(pattern: &str, code: i32, stderr: &str, remaining: Option<AtomicUsize>) -> Script {
        Script {
            pattern: pattern.to_string(),
            output: CommandOutput {
                code: Some(code),
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
            remaining,
            delay: Duration::ZERO,
        }
    }

    /// Handle on the call log, usable after the runner moved into an engine
    pub fn calls(&self) -> CallLog {
        Arc::clone(&self.calls)
    }
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ActionError> {
        self.calls.lock().unwrap().push(spec.clone());
        let line = spec.to_string();

        for script in &self.scripts {
            if !line.contains(&script.pattern) {
                continue;
            }
            if !script.delay.is_zero() {
                tokio::time::sleep(script.delay).await;
            }
            match &script.remaining {
                None => return Ok(script.output.clone()),
                Some(remaining) => {
                    let left = remaining.load(Ordering::SeqCst);
                    if left > 0 {
                        remaining.store(left - 1, Ordering::SeqCst);
                        return Ok(script.output.clone());
                    }
                }
            }
        }

        Ok(CommandOutput {
            code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

/// Fetcher serving fixed bytes per URL
#[derive(Default)]
pub struct CannedFetcher {
    artifacts: HashMap<String, Vec<u8>>,
}

impl CannedFetcher {
    pub fn with(mut self, url: &str, bytes: &[u8]) -> Self {
        self.artifacts.insert(url.to_string(), bytes.to_vec());
        self
    }
}

#[async_trait]
impl ArtifactFetcher for CannedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ActionError> {
        self.artifacts
            .get(url)
            .cloned()
            .ok_or_else(|| ActionError::Fetch {
                url: url.to_string(),
                reason: "404 Not Found".to_string(),
            })
    }
}

/// Displayed command lines of every recorded call
pub fn command_lines(calls: &CallLog) -> Vec<String> {
    calls.lock().unwrap().iter().map(|c| c.to_string()).collect()
}

/// A context rooted in a scratch directory, with its own fake home
pub fn scratch_context(root: &Path) -> ProvisionContext {
    let workdir = root.join("work");
    let home = root.join("home");
    std::fs::create_dir_all(&workdir).unwrap();
    std::fs::create_dir_all(&home).unwrap();
    ProvisionContext::new(workdir, home)
}

/// Parse YAML into a pipeline
pub fn pipeline_from_yaml(yaml: &str) -> Pipeline {
    ProvisionConfig::from_yaml(yaml)
        .expect("test configuration should be valid")
        .to_pipeline()
}

/// Run a pipeline with a mock runner
pub async fn run_with_mock(
    pipeline: &mut Pipeline,
    ctx: &mut ProvisionContext,
    runner: MockRunner,
) -> ProvisionTestResult {
    run_with_fetcher(pipeline, ctx, runner, CannedFetcher::default()).await
}

/// Run a pipeline with a mock runner and canned artifacts
pub async fn run_with_fetcher(
    pipeline: &mut Pipeline,
    ctx: &mut ProvisionContext,
    runner: MockRunner,
    fetcher: CannedFetcher,
) -> ProvisionTestResult {
    let executor = StepExecutor::new(runner)
        .with_fetcher(Arc::new(fetcher))
        .with_retry_delay(Duration::ZERO);
    let engine = ExecutionEngine::with_executor(executor);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    engine
        .add_event_handler(move |event| sink.lock().unwrap().push(event))
        .await;

    let start = std::time::Instant::now();
    let error = engine.execute(pipeline, ctx).await.err().map(|e| e.to_string());
    let duration = start.elapsed();

    let events = events.lock().unwrap().clone();
    ProvisionTestResult {
        pipeline: pipeline.clone(),
        events,
        error,
        duration_ms: duration.as_millis() as u64,
    }
}

/// Outcome of a provisioning run under test
#[derive(Debug, Clone)]
pub struct ProvisionTestResult {
    pub pipeline: Pipeline,
    pub events: Vec<ExecutionEvent>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ProvisionTestResult {
    pub fn is_success(&self) -> bool {
        matches!(self.pipeline.state.status, ExecutionStatus::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.pipeline.state.status, ExecutionStatus::Failed)
    }

    pub fn step_state(&self, step_id: &str) -> &StepState {
        &self
            .pipeline
            .step(step_id)
            .unwrap_or_else(|| panic!("Step '{}' not found in result", step_id))
            .state
    }

    /// Steps whose action actually ran, in order
    pub fn ran_steps(&self) -> Vec<String> {
        self.pipeline
            .steps
            .iter()
            .filter(|s| s.state.did_run())
            .map(|s| s.id.clone())
            .collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "{:?} - {} completed, {} skipped, {} warned, failed step {:?}, {}ms",
            self.pipeline.state.status,
            self.pipeline.state.completed_steps,
            self.pipeline.state.skipped_steps,
            self.pipeline.state.warned_steps,
            self.pipeline.state.failed_step,
            self.duration_ms
        )
    }
}

pub fn assert_step_completed(result: &ProvisionTestResult, step_id: &str) {
    let state = result.step_state(step_id);
    assert!(
        matches!(state, StepState::Completed { .. }),
        "Step '{}' should be completed, but was in state: {:?}",
        step_id,
        state
    );
}

pub fn assert_step_skipped(result: &ProvisionTestResult, step_id: &str) {
    let state = result.step_state(step_id);
    assert!(
        matches!(state, StepState::Skipped { .. }),
        "Step '{}' should be skipped, but was in state: {:?}",
        step_id,
        state
    );
}

pub fn assert_step_warned(result: &ProvisionTestResult, step_id: &str, expected: &str) {
    match result.step_state(step_id) {
        StepState::Warned { warning, .. } => assert!(
            warning.contains(expected),
            "Step '{}' warning:\n{}\n\ndoes not contain:\n{}",
            step_id,
            warning,
            expected
        ),
        other => panic!("Step '{}' should have warned, but was in state: {:?}", step_id, other),
    }
}

pub fn assert_step_failed(result: &ProvisionTestResult, step_id: &str, expected_error: &str) {
    match result.step_state(step_id) {
        StepState::Failed { error, .. } => assert!(
            error.contains(expected_error),
            "Step '{}' error:\n{}\n\ndoes not contain:\n{}",
            step_id,
            error,
            expected_error
        ),
        other => panic!("Step '{}' should have failed, but was in state: {:?}", step_id, other),
    }
}

pub fn assert_step_pending(result: &ProvisionTestResult, step_id: &str) {
    let state = result.step_state(step_id);
    assert!(
        matches!(state, StepState::Pending),
        "Step '{}' should never have started, but was in state: {:?}",
        step_id,
        state
    );
}

pub fn assert_pipeline_completed(result: &ProvisionTestResult) {
    assert!(
        result.is_success(),
        "Pipeline should be completed, but was: {}",
        result.summary()
    );
}

pub fn assert_pipeline_failed(result: &ProvisionTestResult) {
    assert!(
        result.is_failed(),
        "Pipeline should have failed, but was: {}",
        result.summary()
    );
}

/// Assert the steps whose action ran, in order
pub fn assert_execution_order(result: &ProvisionTestResult, expected_order: &[&str]) {
    let actual = result.ran_steps();
    assert_eq!(
        actual, expected_order,
        "Expected execution order: {:?}\nActual: {:?}",
        expected_order, actual
    );
}
