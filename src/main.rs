use anyhow::{Context, Result};
use provision::cli::commands::{
    HistoryCommand, ListCommand, PatchCommand, PlanCommand, RunCommand, ValidateCommand,
};
use provision::cli::output::*;
use provision::cli::terminal_output::ConsoleReporter;
use provision::cli::{Cli, Command};
use provision::core::config::{ProvisionConfig, DEFAULT_CONFIG_FILE};
use provision::core::{ExecutionStatus, Pipeline, ProvisionContext};
use provision::execution::ExecutionEngine;
use provision::action::ProcessRunner;
use provision::persistence::{
    create_summary, ExecutionSummary, InMemoryPersistence, PersistenceBackend,
    SqliteExecutionStore,
};
use provision::template::{self, RewriteRule};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Exit code after Ctrl-C, as a shell would report SIGINT
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command_or_default() {
        Command::Run(cmd) => run_provisioning(cmd, cli.verbose).await?,
        Command::Validate(cmd) => validate_config(cmd)?,
        Command::Plan(cmd) => plan_config(cmd)?,
        Command::Patch(cmd) => patch_script(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
        Command::List(cmd) => list_pipelines(cmd).await?,
    }

    Ok(())
}

fn config_path(file: &Option<String>) -> &str {
    file.as_deref().unwrap_or(DEFAULT_CONFIG_FILE)
}

fn resolve_workdir(workdir: &Option<String>) -> Result<PathBuf> {
    match workdir {
        Some(dir) => {
            let expanded = shellexpand::tilde(dir);
            let path = PathBuf::from(expanded.as_ref());
            std::fs::create_dir_all(&path)
                .with_context(|| format!("Cannot create working directory {}", path.display()))?;
            Ok(path)
        }
        None => std::env::current_dir().context("Cannot determine the current directory"),
    }
}

fn load_config(file: &Option<String>, overrides: &[(String, String)]) -> Result<ProvisionConfig> {
    let mut config = ProvisionConfig::from_file(config_path(file))
        .context("Failed to load provisioning config")?;

    config.override_variables(overrides);
    for (key, value) in overrides {
        println!(
            "{} Variable override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    Ok(config)
}

async fn open_store(no_history: bool) -> Result<Arc<dyn PersistenceBackend>> {
    if no_history {
        Ok(Arc::new(InMemoryPersistence::new()))
    } else {
        Ok(Arc::new(SqliteExecutionStore::with_default_path().await?))
    }
}

async fn run_provisioning(cmd: &RunCommand, verbose: bool) -> Result<()> {
    let config = load_config(&cmd.file, &cmd.var)?;
    println!(
        "{} Loaded configuration: {}",
        INFO,
        style(&config.name).bold()
    );

    let mut pipeline = config.to_pipeline();
    let workdir = resolve_workdir(&cmd.workdir)?;
    let mut ctx = ProvisionContext::from_environment(workdir)?;

    let store = open_store(cmd.no_history).await?;

    let engine = ExecutionEngine::new(ProcessRunner::new());

    // Set up event handler for console output
    let reporter = Arc::new(ConsoleReporter::new(verbose));
    let handler_reporter = Arc::clone(&reporter);
    engine
        .add_event_handler(move |event| handler_reporter.handle(&event))
        .await;

    println!();
    let result = tokio::select! {
        result = engine.execute(&mut pipeline, &mut ctx) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let Some(result) = result else {
        reporter.finish_spinner();
        pipeline.state.cancel();
        println!(
            "\n{} {} {}",
            WARN,
            style(&pipeline.name).bold(),
            style("interrupted").yellow()
        );
        save_history(store.as_ref(), &pipeline, cmd.no_history).await?;
        std::process::exit(EXIT_INTERRUPTED);
    };

    save_history(store.as_ref(), &pipeline, cmd.no_history).await?;

    match result {
        Ok(()) => {
            println!(
                "\n{} {} provisioned {} ({} ran, {} skipped, {} warned)",
                CHECK,
                style(&pipeline.name).bold(),
                style("successfully").green(),
                pipeline.state.completed_steps,
                pipeline.state.skipped_steps,
                pipeline.state.warned_steps
            );
            Ok(())
        }
        Err(e) => {
            println!(
                "\n{} {} {} at step '{}'",
                CROSS,
                style(&pipeline.name).bold(),
                style("failed").red(),
                style(e.step_id()).bold()
            );
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn save_history(
    store: &dyn PersistenceBackend,
    pipeline: &Pipeline,
    no_history: bool,
) -> Result<()> {
    if no_history {
        return Ok(());
    }

    let summary = create_summary(pipeline);
    store.save_execution(&summary).await?;
    println!(
        "{} Run saved to history (ID: {})",
        INFO,
        style(&summary.execution_id.to_string()[..8]).dim()
    );
    Ok(())
}

fn validate_config(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating configuration...", INFO);

    match ProvisionConfig::from_file(config_path(&cmd.file)) {
        Ok(config) => {
            println!("{} Configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Steps: {}", style(config.steps.len()).cyan());
            println!("  Variables: {}", style(config.variables.len()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

fn plan_config(cmd: &PlanCommand) -> Result<()> {
    let config = load_config(&cmd.file, &cmd.var)?;
    let pipeline = config.to_pipeline();
    let ctx = ProvisionContext::from_environment(resolve_workdir(&cmd.workdir)?)?
        .with_variables(pipeline.variables.clone());

    println!(
        "{} Plan for {} in {}",
        INFO,
        style(&pipeline.name).bold(),
        style(ctx.workdir.display()).dim()
    );

    for (index, step) in pipeline.steps.iter().enumerate() {
        let status = match &step.precondition {
            Some(precondition) => match precondition.satisfied(&ctx) {
                Some(reason) => format!("{}would skip ({})", SKIP, reason),
                None if step.stamp_outdated(&ctx) => {
                    format!("{}would run (stamp outdated)", ROCKET)
                }
                None => format!("{}would run ({} not met)", ROCKET, precondition.describe()),
            },
            None if step.stamp_outdated(&ctx) => format!("{}would run (stamp outdated)", ROCKET),
            None if step.action.checks_itself() => {
                format!("{}checked when run", INFO)
            }
            None => format!("{}would run", ROCKET),
        };

        println!(
            "  [{}/{}] {} ({}) {}",
            style(index + 1).cyan(),
            style(pipeline.steps.len()).dim(),
            style(&step.name).bold(),
            style(step.action.kind()).dim(),
            status
        );
    }

    Ok(())
}

fn patch_script(cmd: &PatchCommand) -> Result<()> {
    let rules = template::builtin::validation_rules(&cmd.repo_dir)
        .iter()
        .map(RewriteRule::compile)
        .collect::<Result<Vec<_>, _>>()?;

    let report = template::patch(Path::new(&cmd.source), &rules)
        .with_context(|| format!("Failed to patch {}", cmd.source))?;

    for index in &report.unmatched {
        eprintln!("{} Rule {} matched nothing in {}", WARN, index + 1, cmd.source);
    }

    match &cmd.output {
        Some(output) => {
            let output = Path::new(output);
            if output == Path::new(&cmd.source) {
                anyhow::bail!("Refusing to patch {} in place", cmd.source);
            }
            template::emitter::write_script(output, &report.text)?;
            println!(
                "{} Wrote {}",
                CHECK,
                style(output.display()).bold()
            );
        }
        None => print!("{}", report.text),
    }

    Ok(())
}

async fn list_pipelines(cmd: &ListCommand) -> Result<()> {
    let store = SqliteExecutionStore::with_default_path().await?;
    let pipelines = store.list_pipelines().await?;

    if cmd.json {
        let mut json_data = Vec::new();
        for pipeline in &pipelines {
            let executions = store.list_executions(pipeline).await?;
            json_data.push(serde_json::json!({
                "name": pipeline,
                "run_count": executions.len(),
                "last_status": executions.first().map(|e| e.status),
            }));
        }
        let data = serde_json::json!({ "configurations": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if pipelines.is_empty() {
        println!("{} No configurations found in history", INFO);
        return Ok(());
    }

    println!("{} Configurations in history:", INFO);
    for pipeline_name in &pipelines {
        let executions = store.list_executions(pipeline_name).await?;
        let completed = executions
            .iter()
            .filter(|e| e.status == ExecutionStatus::Completed)
            .count();
        println!(
            "  {} ({} runs: {} succeeded, {} other)",
            style(pipeline_name).bold(),
            style(executions.len()).cyan(),
            style(completed).green(),
            style(executions.len() - completed).red()
        );
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = SqliteExecutionStore::with_default_path().await?;

    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id = uuid::Uuid::parse_str(exec_id_str).context("Invalid run ID format")?;
        match store.load_execution(exec_id).await? {
            Some(summary) => print_execution_details(&summary, cmd.json)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    let executions: Vec<ExecutionSummary> = match &cmd.pipeline {
        Some(pipeline_name) => store
            .list_executions(pipeline_name)
            .await?
            .into_iter()
            .take(cmd.limit)
            .collect(),
        None => store.list_recent(cmd.limit).await?,
    };

    if cmd.json {
        let data = serde_json::json!({ "runs": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if executions.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    println!("{} Run history (showing latest {}):", INFO, cmd.limit);
    for summary in &executions {
        println!("  {}", format_execution_summary(summary));
    }

    Ok(())
}

fn print_execution_details(summary: &ExecutionSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Configuration: {}", style(&summary.pipeline_name).bold());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Progress: {} ({} ran, {} skipped, {} warned of {})",
        style(format!("{:.0}%", summary.progress * 100.0)).cyan(),
        summary.completed_steps,
        summary.skipped_steps,
        summary.warned_steps,
        summary.total_steps
    );
    if let Some(step) = &summary.failed_step {
        println!("  Failed step: {}", style(step).red());
    }

    Ok(())
}
