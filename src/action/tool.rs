//! Command resolution and tool installation

use crate::action::fetch::fetch_verified;
use crate::action::{ActionError, ActionOutcome, ArtifactFetcher, CommandRunner, CommandSpec, ToolSource};
use crate::core::ProvisionContext;
use crate::execution::installer::{ensure, Ensured};
use std::path::{Path, PathBuf};
use tracing::info;

/// Find an executable by name in `extra_dirs`, then on `PATH`
///
/// A name containing a slash is checked as a path as-is.
pub fn resolve_command(name: &str, extra_dirs: &[PathBuf]) -> Option<PathBuf> {
    if name.contains('/') {
        let path = PathBuf::from(name);
        return is_executable(&path).then_some(path);
    }

    let path_dirs = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).collect::<Vec<_>>())
        .unwrap_or_default();

    extra_dirs
        .iter()
        .chain(path_dirs.iter())
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Make `tool` available, installing it from `source` when it cannot be found
///
/// The resolved executable path is returned in the outcome so later steps
/// receive it explicitly.
pub async fn install_tool(
    runner: &dyn CommandRunner,
    fetcher: &dyn ArtifactFetcher,
    ctx: &ProvisionContext,
    tool: &str,
    source: &ToolSource,
    search_paths: &[String],
    force: bool,
) -> Result<ActionOutcome, ActionError> {
    let mut dirs: Vec<PathBuf> = search_paths.iter().map(|p| ctx.resolve_path(p)).collect();
    dirs.extend(ctx.tool_dirs());

    let found = if force { None } else { resolve_command(tool, &dirs) };

    let ensured = ensure(
        || {
            found
                .as_ref()
                .map(|path| format!("`{}` already available at {}", tool, path.display()))
        },
        || run_installer(runner, fetcher, ctx, source),
    )
    .await?;

    let output = match ensured {
        Ensured::AlreadySatisfied(reason) => {
            let outcome = ActionOutcome::satisfied(reason);
            return Ok(match found {
                Some(path) => outcome.with_tool(tool, path),
                None => outcome,
            });
        }
        Ensured::Performed(output) => output,
    };

    match resolve_command(tool, &dirs) {
        Some(path) => {
            info!("Installed {} at {}", tool, path.display());
            Ok(ActionOutcome::new(output).with_tool(tool, path))
        }
        None => {
            let mut searched: Vec<String> = dirs.iter().map(|d| d.display().to_string()).collect();
            searched.push("$PATH".to_string());
            Err(ActionError::ToolNotFoundAfterInstall {
                tool: tool.to_string(),
                searched: searched.join(", "),
            })
        }
    }
}

async fn run_installer(
    runner: &dyn CommandRunner,
    fetcher: &dyn ArtifactFetcher,
    ctx: &ProvisionContext,
    source: &ToolSource,
) -> Result<String, ActionError> {
    let spec = match source {
        ToolSource::Artifact {
            url,
            sha256,
            interpreter,
            args,
        } => {
            let script = fetch_verified(fetcher, url, sha256, &ctx.cache_dir()).await?;
            CommandSpec::new(interpreter.as_str())
                .arg(script.display().to_string())
                .args(args.iter().cloned())
        }
        ToolSource::Command { program, args } => {
            CommandSpec::new(program.as_str()).args(args.iter().cloned())
        }
    };

    let output = runner
        .run_checked(&spec.current_dir(&ctx.workdir).env("HOME", ctx.home.display().to_string()))
        .await?;
    Ok(output.stdout)
}
