//! CLI command definitions

use clap::Args;

/// Run a provisioning configuration
#[derive(Debug, Args, Clone, Default)]
pub struct RunCommand {
    /// Path to the configuration YAML file (default: provision.yaml)
    #[arg(short, long)]
    pub file: Option<String>,

    /// Variable overrides (key=value)
    #[arg(long, value_parser = parse_key_value)]
    pub var: Vec<(String, String)>,

    /// Working directory the steps run in (default: current directory)
    #[arg(long)]
    pub workdir: Option<String>,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,
}

/// Validate a provisioning configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to the configuration YAML file
    #[arg(short, long)]
    pub file: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show the ordered steps and whether each would run
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    /// Path to the configuration YAML file
    #[arg(short, long)]
    pub file: Option<String>,

    /// Variable overrides (key=value)
    #[arg(long, value_parser = parse_key_value)]
    pub var: Vec<(String, String)>,

    /// Working directory the steps would run in
    #[arg(long)]
    pub workdir: Option<String>,
}

/// Apply the validation preset to a script
#[derive(Debug, Args, Clone)]
pub struct PatchCommand {
    /// Script to rewrite
    pub source: String,

    /// Repository directory name the paths are rewritten under
    #[arg(long)]
    pub repo_dir: String,

    /// Where to write the patched script (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<String>,
}

/// List configurations with history
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Configuration name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single run by ID
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
