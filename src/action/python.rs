//! Python virtual environments and dependency installation

use crate::action::{ActionError, ActionOutcome, CommandRunner, CommandSpec};
use crate::core::ProvisionContext;
use crate::execution::installer::{ensure, Ensured};
use tracing::{info, warn};

/// Create a virtual environment unless its directory already exists
///
/// With `force` (stale version stamp) the environment is recreated from
/// scratch.
pub async fn create_venv(
    runner: &dyn CommandRunner,
    ctx: &ProvisionContext,
    path: &str,
    python: &str,
    force: bool,
) -> Result<ActionOutcome, ActionError> {
    let venv = ctx.resolve_path(path);
    let venv_str = venv.display().to_string();

    let ensured = ensure(
        || {
            (!force && venv.is_dir()).then(|| format!("virtual environment {} exists", venv_str))
        },
        || async {
            let mut spec = CommandSpec::new(python).args(["-m", "venv"]);
            if force {
                spec = spec.arg("--clear");
            }
            runner
                .run_checked(&spec.arg(venv_str.as_str()).current_dir(&ctx.workdir))
                .await
        },
    )
    .await?;

    Ok(match ensured {
        Ensured::AlreadySatisfied(reason) => ActionOutcome::satisfied(reason),
        Ensured::Performed(_) => ActionOutcome::new(format!("Created virtual environment {}", venv_str)),
    })
}

/// Install a project's dependencies into `venv`
///
/// `requirements.txt` wins over `setup.py`; with neither, the fallback
/// package list is installed. An empty fallback only produces a warning.
pub async fn install_dependencies(
    runner: &dyn CommandRunner,
    ctx: &ProvisionContext,
    venv: &str,
    project_dir: &str,
    fallback: &[String],
) -> Result<ActionOutcome, ActionError> {
    let venv_path = ctx.resolve_path(venv);
    let pip = venv_path.join("bin").join("pip");
    if !pip.exists() {
        return Err(ActionError::MissingPrerequisite {
            what: "pip in the virtual environment".to_string(),
            path: pip,
        });
    }

    let project = ctx.resolve_path(project_dir);
    let pip_str = pip.display().to_string();
    let pip_install = || CommandSpec::new(pip_str.as_str()).arg("install").current_dir(&project);

    runner
        .run_checked(&pip_install().args(["--upgrade", "pip"]))
        .await?;

    let requirements = project.join("requirements.txt");
    let setup_py = project.join("setup.py");

    let (spec, description) = if requirements.is_file() {
        info!("Installing from {}", requirements.display());
        (
            pip_install().args(["-r".to_string(), requirements.display().to_string()]),
            "requirements.txt".to_string(),
        )
    } else if setup_py.is_file() {
        info!("Installing {} in editable mode", project.display());
        (
            pip_install().args(["-e".to_string(), project.display().to_string()]),
            "setup.py".to_string(),
        )
    } else if !fallback.is_empty() {
        info!("No manifest in {}, installing fallback packages", project.display());
        (
            pip_install().args(fallback.iter().cloned()),
            format!("fallback packages ({})", fallback.join(", ")),
        )
    } else {
        warn!("No requirements.txt or setup.py in {}", project.display());
        return Ok(ActionOutcome::new("Nothing to install")
            .with_warning(format!("No dependency manifest found in {}", project.display())));
    };

    runner.run_checked(&spec).await?;
    Ok(ActionOutcome::new(format!("Installed dependencies from {}", description)))
}
