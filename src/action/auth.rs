//! Git authentication from a secret token file

use crate::action::{ActionError, ActionOutcome, CommandRunner, CommandSpec};
use crate::core::ProvisionContext;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Owner read/write only
pub const SECRET_MODE: u32 = 0o600;

/// A credential read from a secret file
///
/// The token is only ever shown redacted.
pub struct TokenFile {
    path: PathBuf,
    token: String,
}

impl std::fmt::Debug for TokenFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenFile")
            .field("path", &self.path)
            .field("token", &"***")
            .finish()
    }
}

impl TokenFile {
    /// Load a token, tightening the file's permissions first
    ///
    /// The content is not validated beyond being non-empty.
    pub fn load(path: &Path) -> Result<Self, ActionError> {
        if !path.is_file() {
            return Err(ActionError::MissingSecret {
                path: path.to_path_buf(),
            });
        }

        enforce_permissions(path)?;

        let token = std::fs::read_to_string(path)
            .map_err(|e| ActionError::io(path, e))?
            .trim()
            .to_string();
        if token.is_empty() {
            return Err(ActionError::MissingSecret {
                path: path.to_path_buf(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            token,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Restrict a secret file to owner read/write
#[cfg(unix)]
pub fn enforce_permissions(path: &Path) -> Result<(), ActionError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path).map_err(|e| ActionError::io(path, e))?;
    let mode = metadata.permissions().mode() & 0o777;
    if mode != SECRET_MODE {
        warn!(
            "{} had mode {:o}, tightening to {:o}",
            path.display(),
            mode,
            SECRET_MODE
        );
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(SECRET_MODE))
            .map_err(|e| ActionError::io(path, e))?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn enforce_permissions(_path: &Path) -> Result<(), ActionError> {
    Ok(())
}

/// Embed `token` as the user part of an https remote URL
///
/// Existing credentials in the URL are replaced.
pub fn authenticated_url(url: &str, token: &str) -> Result<String, ActionError> {
    let rest = url
        .strip_prefix("https://")
        .ok_or_else(|| ActionError::UnsupportedRemote(url.to_string()))?;

    let (authority, path) = match rest.find('/') {
        Some(index) => rest.split_at(index),
        None => (rest, ""),
    };
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);

    Ok(format!("https://{}@{}{}", token, host, path))
}

/// Point `remote` of the repository at an authenticated URL and probe it
pub async fn configure_git_auth(
    runner: &dyn CommandRunner,
    ctx: &ProvisionContext,
    token_file: &str,
    repo_dir: &str,
    url: &str,
    remote: &str,
) -> Result<ActionOutcome, ActionError> {
    let token = TokenFile::load(&ctx.resolve_path(token_file))?;

    let repo = ctx.resolve_path(repo_dir);
    if !repo.join(".git").exists() {
        return Err(ActionError::MissingPrerequisite {
            what: "cloned repository".to_string(),
            path: repo,
        });
    }
    let repo_str = repo.display().to_string();

    let remote_url = authenticated_url(url, token.token())?;
    let set_url = CommandSpec::new("git")
        .args(["-C", repo_str.as_str(), "remote", "set-url", remote, remote_url.as_str()])
        .redact(token.token());
    debug!("Running {}", set_url);
    runner.run_checked(&set_url).await?;

    let probe = CommandSpec::new("git")
        .args(["-C", repo_str.as_str(), "ls-remote", "--heads", remote])
        .env("GIT_TERMINAL_PROMPT", "0")
        .redact(token.token());
    runner
        .run_checked(&probe)
        .await
        .map_err(|e| ActionError::ProbeFailed {
            remote: remote.to_string(),
            detail: e.to_string(),
        })?;

    info!("Remote '{}' of {} is authenticated", remote, repo_str);
    Ok(ActionOutcome::new(format!(
        "Authenticated remote '{}' using {}",
        remote,
        token.path().display()
    )))
}
