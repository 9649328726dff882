//! Post-commit last-modified bookkeeping.
//!
//! After a successful write the mtime of `<control-dir>/info/last-modified`
//! is bumped. This is best-effort: the write has already committed, so every
//! failure is logged and swallowed.

use std::fs::{DirBuilder, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::core::GuardError;

/// Directory below the control directory holding the timestamp file.
pub const INFO_DIR: &str = "info";

/// Timestamp file name.
pub const LAST_MODIFIED_FILE: &str = "last-modified";

/// What [`touch_last_modified`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TouchOutcome {
    /// The timestamp file was created.
    Created,
    /// An existing timestamp file had its mtime updated.
    Touched,
    /// Something failed; the cause was logged.
    Failed,
}

/// Location of the timestamp file for `control_dir`.
pub fn last_modified_path(control_dir: &Path) -> PathBuf {
    control_dir.join(INFO_DIR).join(LAST_MODIFIED_FILE)
}

/// Record that the repository at `control_dir` was just modified.
pub fn touch_last_modified(control_dir: &Path) -> TouchOutcome {
    match try_touch(control_dir) {
        Ok(outcome) => {
            tracing::debug!(?outcome, dir = %control_dir.display(), "last-modified updated");
            outcome
        }
        Err(e) => {
            tracing::warn!("failed to update last-modified timestamp: {}", e);
            TouchOutcome::Failed
        }
    }
}

fn try_touch(control_dir: &Path) -> Result<TouchOutcome, GuardError> {
    let info_dir = control_dir.join(INFO_DIR);
    if !info_dir.is_dir() {
        create_info_dir(&info_dir)?;
    }

    let path = info_dir.join(LAST_MODIFIED_FILE);
    match create_timestamp_file(&path) {
        Ok(()) => return Ok(TouchOutcome::Created),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
        Err(e) => return Err(GuardError::io(&path, e)),
    }

    let file = OpenOptions::new()
        .write(true)
        .open(&path)
        .map_err(|e| GuardError::io(&path, e))?;
    file.set_modified(SystemTime::now())
        .map_err(|e| GuardError::io(&path, e))?;
    Ok(TouchOutcome::Touched)
}

fn create_info_dir(path: &Path) -> Result<(), GuardError> {
    let mut builder = DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o775);
    }
    match builder.create(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(GuardError::io(path, e)),
    }
}

fn create_timestamp_file(path: &Path) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options.open(path).map(drop)
}
