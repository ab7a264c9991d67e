//! Repository acquisition - clone fresh or pull latest

use crate::action::{ActionError, ActionOutcome, CommandRunner, CommandSpec};
use crate::core::ProvisionContext;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

/// Clone `url` into `dest`, or fast-forward `dest` when it already exists
///
/// Each git command is bounded by `limit`. A failed or stalled pull is a
/// soft failure: the existing checkout is still usable, so the outcome
/// carries a warning instead of an error.
pub async fn sync_repository(
    runner: &dyn CommandRunner,
    ctx: &ProvisionContext,
    url: &str,
    dest: &str,
    branch: Option<&str>,
    limit: Duration,
) -> Result<ActionOutcome, ActionError> {
    let dest_path = ctx.resolve_path(dest);
    let dest_str = dest_path.display().to_string();

    if dest_path.is_dir() {
        info!("Repository already present at {}, pulling latest changes", dest_str);
        let pull = CommandSpec::new("git")
            .args(["-C", dest_str.as_str(), "pull", "--ff-only"])
            .current_dir(&ctx.workdir);

        let pulled = timeout(limit, runner.run_checked(&pull))
            .await
            .unwrap_or(Err(ActionError::Timeout(limit.as_secs())));

        return match pulled {
            Ok(output) => Ok(ActionOutcome::new(output.stdout)),
            Err(e) => {
                warn!("Could not pull latest changes in {}: {}", dest_str, e);
                Ok(ActionOutcome::new(format!("Kept existing checkout at {}", dest_str))
                    .with_warning(format!("Pull failed, continuing with existing checkout: {}", e)))
            }
        };
    }

    info!("Cloning {} into {}", url, dest_str);
    let mut clone = CommandSpec::new("git").arg("clone");
    if let Some(branch) = branch {
        clone = clone.args(["--branch", branch]);
    }
    let clone = clone.args([url, dest_str.as_str()]).current_dir(&ctx.workdir);

    let output = timeout(limit, runner.run_checked(&clone))
        .await
        .unwrap_or(Err(ActionError::Timeout(limit.as_secs())))?;
    Ok(ActionOutcome::new(if output.stdout.trim().is_empty() {
        format!("Cloned into {}", dest_str)
    } else {
        output.stdout
    }))
}
