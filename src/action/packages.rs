//! System packages via apt-get

use crate::action::{ActionError, ActionOutcome, CommandRunner, CommandSpec};
use tracing::info;

fn apt_get(sudo: bool) -> CommandSpec {
    if sudo {
        CommandSpec::new("sudo").args(["DEBIAN_FRONTEND=noninteractive", "apt-get"])
    } else {
        CommandSpec::new("apt-get").env("DEBIAN_FRONTEND", "noninteractive")
    }
}

/// Refresh the package index (optionally) and install `packages`
pub async fn install_packages(
    runner: &dyn CommandRunner,
    packages: &[String],
    sudo: bool,
    update: bool,
) -> Result<ActionOutcome, ActionError> {
    if update {
        runner.run_checked(&apt_get(sudo).arg("update")).await?;
    }

    info!("Installing packages: {}", packages.join(" "));
    runner
        .run_checked(&apt_get(sudo).args(["install", "-y"]).args(packages.iter().cloned()))
        .await?;

    Ok(ActionOutcome::new(format!("Installed {}", packages.join(", "))))
}
