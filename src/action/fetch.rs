//! Pinned artifact downloads
//!
//! Remote installers are never piped straight into a shell. They are
//! downloaded, checked against the SHA-256 digest pinned in the
//! configuration and only then stored for the interpreter to run.

use crate::action::ActionError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Source of artifact bytes - swapped for a canned fetcher in tests
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ActionError>;
}

/// Fetches artifacts over HTTPS
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ActionError> {
        let fetch_error = |reason: String| ActionError::Fetch {
            url: url.to_string(),
            reason,
        };

        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        Ok(body.to_vec())
    }
}

/// Lower-case hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Check `bytes` against a pinned digest
pub fn verify_sha256(url: &str, bytes: &[u8], expected: &str) -> Result<(), ActionError> {
    let actual = sha256_hex(bytes);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(ActionError::ChecksumMismatch {
            url: url.to_string(),
            expected: expected.to_lowercase(),
            actual,
        })
    }
}

/// Download `url`, verify it and store it under `cache_dir`
///
/// The artifact is named after its digest. A cached copy whose content
/// still matches is reused without touching the network.
pub async fn fetch_verified(
    fetcher: &dyn ArtifactFetcher,
    url: &str,
    sha256: &str,
    cache_dir: &Path,
) -> Result<PathBuf, ActionError> {
    let path = cache_dir.join(sha256.to_lowercase());

    if let Ok(cached) = std::fs::read(&path) {
        if verify_sha256(url, &cached, sha256).is_ok() {
            debug!("Using cached artifact {}", path.display());
            return Ok(path);
        }
    }

    info!("Downloading {}", url);
    let bytes = fetcher.fetch(url).await?;
    verify_sha256(url, &bytes, sha256)?;

    std::fs::create_dir_all(cache_dir).map_err(|e| ActionError::io(cache_dir, e))?;
    std::fs::write(&path, &bytes).map_err(|e| ActionError::io(&path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o700))
            .map_err(|e| ActionError::io(&path, e))?;
    }

    Ok(path)
}
