//! Template emitter - renders text blobs and writes them to disk

use crate::action::ActionError;
use crate::template::render_placeholders;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Render `template` with `substitutions` and write it to `path`
///
/// Any existing file is overwritten. Scripts (`executable = true`) get
/// mode 0755 set explicitly after the write.
pub fn emit(
    path: &Path,
    template: &str,
    substitutions: &BTreeMap<String, String>,
    executable: bool,
) -> Result<(), ActionError> {
    let content = render_placeholders(template, substitutions);
    if executable {
        write_script(path, &content)
    } else {
        write_text(path, &content)
    }
}

/// Write a script and mark it executable
pub fn write_script(path: &Path, content: &str) -> Result<(), ActionError> {
    write_text(path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)
            .map_err(|e| ActionError::io(path, e))?
            .permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms).map_err(|e| ActionError::io(path, e))?;
    }

    Ok(())
}

fn write_text(path: &Path, content: &str) -> Result<(), ActionError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| ActionError::io(parent, e))?;
        }
    }

    std::fs::write(path, content).map_err(|e| ActionError::io(path, e))?;
    debug!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}
