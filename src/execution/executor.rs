//! Step executor - runs a single provisioning step

use crate::{
    action::{
        auth, git, packages, python, tool, Action, ActionError, ActionOutcome, ArtifactFetcher,
        CommandRunner, CommandSpec, HttpFetcher,
    },
    core::{config::FailurePolicy, ProvisionContext, Step},
    execution::installer::{ensure, Ensured},
    template::{self, builtin, PatchError, RewriteRule},
};
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

/// Pause between attempts of a retried step
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Callback invoked before a retry with the upcoming attempt number
pub type RetryCallback<'a> = &'a (dyn Fn(usize, &ActionError) + Send + Sync);

/// Result of executing a step
#[derive(Debug)]
pub enum ExecutionResult {
    /// The precondition held; the action did not run
    Skipped { reason: String },
    /// The action completed
    Success { output: String, attempts: usize },
    /// The action failed softly; the run goes on
    Warned { warning: String, attempts: usize },
    /// The action failed hard after exhausting its attempts
    Failed { error: ActionError, attempts: usize },
}

/// Executes a single step
pub struct StepExecutor<R> {
    runner: R,
    fetcher: Arc<dyn ArtifactFetcher>,
    retry_delay: Duration,
}

impl<R: CommandRunner> StepExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            fetcher: Arc::new(HttpFetcher::new()),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Execute a step and return the result
    ///
    /// Tools resolved by the step are recorded in `ctx`; a stamped step
    /// writes its stamp after its action actually ran.
    pub async fn execute(
        &self,
        step: &Step,
        ctx: &mut ProvisionContext,
        on_retry: Option<RetryCallback<'_>>,
    ) -> ExecutionResult {
        info!("Executing step: {}", step.id);

        let force = step.stamp_outdated(ctx);
        if force {
            info!("Stamp for step {} is outdated, forcing a re-run", step.id);
        }

        let shared: &ProvisionContext = ctx;
        let ensured = ensure(
            || step.precondition.as_ref().and_then(|p| p.satisfied(shared)),
            || self.run_with_retries(step, shared, force, on_retry),
        )
        .await;

        match ensured {
            Ok(Ensured::AlreadySatisfied(reason)) => ExecutionResult::Skipped { reason },
            Ok(Ensured::Performed((outcome, attempts))) => {
                self.finish(step, ctx, outcome, attempts)
            }
            Err((error, attempts)) => match step.on_failure {
                FailurePolicy::Warn => {
                    warn!("Step {} failed, continuing: {}", step.id, error);
                    ExecutionResult::Warned {
                        warning: error.to_string(),
                        attempts,
                    }
                }
                FailurePolicy::Abort => {
                    error!("Step {} failed after {} attempt(s): {}", step.id, attempts, error);
                    ExecutionResult::Failed { error, attempts }
                }
            },
        }
    }

    fn finish(
        &self,
        step: &Step,
        ctx: &mut ProvisionContext,
        outcome: ActionOutcome,
        attempts: usize,
    ) -> ExecutionResult {
        if let Some((name, path)) = outcome.resolved_tool {
            debug!("Recording tool {} at {}", name, path.display());
            ctx.record_tool(&name, path);
        }

        if let Some(reason) = outcome.already_satisfied {
            return ExecutionResult::Skipped { reason };
        }

        if let Some(stamp) = &step.stamp {
            if let Err(e) = ctx.write_stamp(&step.id, stamp) {
                warn!("Could not write stamp for step {}: {}", step.id, e);
            }
        }

        match outcome.warning {
            Some(warning) => {
                warn!("Step {} completed with a warning: {}", step.id, warning);
                ExecutionResult::Warned { warning, attempts }
            }
            None => {
                info!("Step {} completed successfully", step.id);
                ExecutionResult::Success {
                    output: outcome.output,
                    attempts,
                }
            }
        }
    }

    async fn run_with_retries(
        &self,
        step: &Step,
        ctx: &ProvisionContext,
        force: bool,
        on_retry: Option<RetryCallback<'_>>,
    ) -> Result<(ActionOutcome, usize), (ActionError, usize)> {
        let action = step.action.render(&ctx.rendering_variables());
        debug!("Rendered action for step {}: {:?}", step.id, action);

        let max_attempts = step.max_attempts();
        let mut attempt = 1;

        let limit = Duration::from_secs(step.timeout_secs);

        loop {
            let dispatched = self.dispatch(&action, ctx, force, limit);
            let result = if let Action::GitSync { .. } = action {
                // git sync bounds its own commands so a stalled pull stays soft
                dispatched.await
            } else {
                match timeout(limit, dispatched).await {
                    Ok(result) => result,
                    Err(_) => {
                        error!("Timeout for step {} after {}s", step.id, step.timeout_secs);
                        Err(ActionError::Timeout(step.timeout_secs))
                    }
                }
            };

            match result {
                Ok(outcome) => return Ok((outcome, attempt)),
                Err(e) if attempt < max_attempts && e.is_retryable() => {
                    warn!(
                        "Step {} attempt {}/{} failed: {}",
                        step.id, attempt, max_attempts, e
                    );
                    attempt += 1;
                    if let Some(callback) = on_retry {
                        callback(attempt, &e);
                    }
                    if !self.retry_delay.is_zero() {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
                Err(e) => return Err((e, attempt)),
            }
        }
    }

    async fn dispatch(
        &self,
        action: &Action,
        ctx: &ProvisionContext,
        force: bool,
        limit: Duration,
    ) -> Result<ActionOutcome, ActionError> {
        let runner: &dyn CommandRunner = &self.runner;

        match action {
            Action::Command {
                program,
                args,
                cwd,
                env,
            } => {
                let output = runner
                    .run_checked(&command_spec(ctx, program, args, cwd.as_deref(), env))
                    .await?;
                Ok(ActionOutcome::new(output.stdout))
            }
            Action::Packages {
                packages,
                sudo,
                update,
            } => packages::install_packages(runner, packages, *sudo, *update).await,
            Action::InstallTool {
                tool,
                source,
                search_paths,
            } => {
                tool::install_tool(
                    runner,
                    self.fetcher.as_ref(),
                    ctx,
                    tool,
                    source,
                    search_paths,
                    force,
                )
                .await
            }
            Action::GitSync { url, dest, branch } => {
                git::sync_repository(runner, ctx, url, dest, branch.as_deref(), limit).await
            }
            Action::Venv { path, python } => python::create_venv(runner, ctx, path, python, force).await,
            Action::PythonDeps {
                venv,
                project_dir,
                fallback,
            } => python::install_dependencies(runner, ctx, venv, project_dir, fallback).await,
            Action::Template {
                path,
                builtin,
                source,
                content,
                vars,
                executable,
            } => {
                let body = match (builtin, source, content) {
                    (Some(name), _, _) => builtin::lookup(name)
                        .ok_or_else(|| ActionError::UnknownTemplate(name.clone()))?
                        .to_string(),
                    (None, Some(source), _) => {
                        let source = ctx.resolve_path(source);
                        std::fs::read_to_string(&source).map_err(|e| ActionError::io(&source, e))?
                    }
                    (None, None, Some(content)) => content.clone(),
                    (None, None, None) => {
                        return Err(ActionError::UnknownTemplate(path.clone()));
                    }
                };

                let mut substitutions = ctx.rendering_variables();
                substitutions.extend(vars.clone());

                let dest = ctx.resolve_path(path);
                template::emit(&dest, &body, &substitutions, *executable)?;
                Ok(ActionOutcome::new(format!("Wrote {}", dest.display())))
            }
            Action::PatchScript {
                source,
                dest,
                preset,
                repo_dir,
                rules,
            } => {
                let mut configs = match (preset, repo_dir) {
                    (Some(preset), Some(repo_dir)) => preset.rules(repo_dir),
                    _ => Vec::new(),
                };
                configs.extend(rules.iter().cloned());

                let compiled = configs
                    .iter()
                    .map(RewriteRule::compile)
                    .collect::<Result<Vec<_>, _>>()?;

                let source = ctx.resolve_path(source);
                let dest = ctx.resolve_path(dest);
                if source == dest {
                    return Err(PatchError::InPlace(dest).into());
                }

                let report = template::patch(&source, &compiled)?;
                if !report.unmatched.is_empty() {
                    warn!(
                        "{} of {} rewrite rules matched nothing in {}",
                        report.unmatched.len(),
                        compiled.len(),
                        source.display()
                    );
                }

                template::write_script(&dest, &report.text)?;
                Ok(ActionOutcome::new(format!(
                    "Patched {} into {}",
                    source.display(),
                    dest.display()
                )))
            }
            Action::GitAuth {
                token_file,
                repo_dir,
                url,
                remote,
            } => auth::configure_git_auth(runner, ctx, token_file, repo_dir, url, remote).await,
        }
    }
}

/// Build a command, handing recorded tool locations to it explicitly
///
/// A program named after a recorded tool runs from its resolved path, and
/// every recorded tool directory is put in front of the child's `PATH`.
fn command_spec(
    ctx: &ProvisionContext,
    program: &str,
    args: &[String],
    cwd: Option<&str>,
    env: &std::collections::BTreeMap<String, String>,
) -> CommandSpec {
    let program = ctx
        .tool(program)
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| program.to_string());

    let mut spec = CommandSpec::new(program)
        .args(args.iter().cloned())
        .current_dir(cwd.map_or_else(|| ctx.workdir.clone(), |dir| ctx.resolve_path(dir)));

    let tool_dirs = ctx.tool_dirs();
    if !tool_dirs.is_empty() && !env.contains_key("PATH") {
        let inherited = std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).collect::<Vec<_>>())
            .unwrap_or_default();
        if let Ok(path) = std::env::join_paths(tool_dirs.iter().chain(inherited.iter())) {
            spec = spec.env("PATH", path.to_string_lossy());
        }
    }

    for (key, value) in env {
        spec = spec.env(key.as_str(), value.as_str());
    }
    spec
}
