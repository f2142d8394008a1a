use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{DeployError, DeployResult};

/// What [`install_validated`] did to the target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// The file already had this content; nothing was touched.
    Unchanged,
    /// New content is in place and passed validation.
    Changed,
}

/// Write `content` to `path`, then run `validate`.
///
/// When validation fails the previous file content is restored
/// byte-for-byte (or the file is removed if it did not exist), and
/// a [`DeployError::ValidationFailed`] is returned. Callers reload
/// their daemon only on [`Activation::Changed`].
pub fn install_validated(
    path: &Path,
    content: &str,
    validate: impl FnOnce() -> DeployResult<()>,
) -> DeployResult<Activation> {
    let previous = fs::read(path).ok();
    if previous.as_deref() == Some(content.as_bytes()) {
        info!("{} unchanged", path.display());
        return Ok(Activation::Unchanged);
    }

    write_atomic(path, content.as_bytes())?;

    match validate() {
        Ok(()) => {
            info!("installed {}", path.display());
            Ok(Activation::Changed)
        }
        Err(e) => {
            warn!("{} failed validation, restoring previous version", path.display());
            restore(path, previous.as_deref())?;
            Err(DeployError::ValidationFailed {
                path: path.display().to_string(),
                reason: validation_reason(&e),
            })
        }
    }
}

/// [`install_validated`] over a set of files that must change
/// together. Every changed file is written before any is validated;
/// one failure restores all of them.
pub fn install_all_validated(
    files: &[(PathBuf, String)],
    validate: impl Fn(&Path) -> DeployResult<()>,
) -> DeployResult<Activation> {
    let mut written: Vec<(&Path, Option<Vec<u8>>)> = Vec::new();

    for (path, content) in files {
        let previous = fs::read(path).ok();
        if previous.as_deref() == Some(content.as_bytes()) {
            info!("{} unchanged", path.display());
            continue;
        }
        if let Err(e) = write_atomic(path, content.as_bytes()) {
            restore_all(&written)?;
            return Err(e);
        }
        written.push((path.as_path(), previous));
    }

    if written.is_empty() {
        return Ok(Activation::Unchanged);
    }

    for (path, _) in &written {
        if let Err(e) = validate(path) {
            warn!("{} failed validation, restoring {} file(s)", path.display(), written.len());
            restore_all(&written)?;
            return Err(DeployError::ValidationFailed {
                path: path.display().to_string(),
                reason: validation_reason(&e),
            });
        }
    }

    for (path, _) in &written {
        info!("installed {}", path.display());
    }
    Ok(Activation::Changed)
}

fn restore(path: &Path, previous: Option<&[u8]>) -> DeployResult<()> {
    match previous {
        Some(bytes) => write_atomic(path, bytes),
        None => Ok(fs::remove_file(path)?),
    }
}

fn restore_all(written: &[(&Path, Option<Vec<u8>>)]) -> DeployResult<()> {
    for (path, previous) in written {
        restore(path, previous.as_deref())?;
    }
    Ok(())
}

/// Replace `path` via a temporary sibling and a rename, so readers
/// never observe a half-written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> DeployResult<()> {
    let tmp = temp_sibling(path)?;
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// [`write_atomic`] for secrets: the content only ever exists on
/// disk with mode `0600`.
pub fn write_private(path: &Path, bytes: &[u8]) -> DeployResult<()> {
    let tmp = temp_sibling(path)?;
    if tmp.exists() {
        fs::remove_file(&tmp)?;
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(&tmp)?;
    // The umask can only remove bits; pin the mode regardless.
    fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)?;
    Ok(())
}

fn temp_sibling(path: &Path) -> DeployResult<PathBuf> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".djploy-tmp");
    Ok(path.with_file_name(tmp_name))
}

fn validation_reason(e: &DeployError) -> String {
    match e {
        DeployError::CommandFailed { command, stderr, .. } if !stderr.is_empty() => {
            format!("{command}: {stderr}")
        }
        other => other.to_string(),
    }
}
