//! Reading the live site config and writing its backup and transformed copy.
//!
//! Failures carry the path involved so the binaries can tell the operator
//! whether to re-run with sudo or fix the path.

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::SystemTime,
};

use thiserror::Error;
use time::OffsetDateTime;

/// Placeholder in a backup path that is replaced with a Unix timestamp
pub const TIMESTAMP_PLACEHOLDER: &str = "{timestamp}";

#[derive(Error, Debug)]
pub enum SiteFileError {
    /// The file exists but the current user cannot read it
    #[error("permission denied reading {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("file does not exist: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Reads the whole site configuration, classifying the common failures
pub fn read_site_config(path: &Path) -> Result<String, SiteFileError> {
    let contents = fs::read_to_string(path).map_err(|source| match source.kind() {
        io::ErrorKind::PermissionDenied => SiteFileError::PermissionDenied {
            path: path.to_path_buf(),
        },
        io::ErrorKind::NotFound => SiteFileError::NotFound {
            path: path.to_path_buf(),
        },
        _ => SiteFileError::Read {
            path: path.to_path_buf(),
            source,
        },
    })?;

    tracing::debug!(path = %path.display(), bytes = contents.len(), "site config read");
    Ok(contents)
}

/// Writes `contents` to `path`, replacing whatever is there.
/// Used for both backups and transformed copies; the live config is never a target.
pub fn write_copy(path: &Path, contents: &str) -> Result<(), SiteFileError> {
    fs::write(path, contents).map_err(|source| SiteFileError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(path = %path.display(), bytes = contents.len(), "file written");
    Ok(())
}

/// Substitutes `{timestamp}` in a backup path template.
/// Paths without the placeholder are returned unchanged.
pub fn render_backup_path(template: &Path, stamp: i64) -> PathBuf {
    let raw = template.to_string_lossy();
    if !raw.contains(TIMESTAMP_PLACEHOLDER) {
        return template.to_path_buf();
    }

    PathBuf::from(raw.replace(TIMESTAMP_PLACEHOLDER, &stamp.to_string()))
}

/// Modification time of the running executable in Unix seconds (rounded),
/// falling back to the current time when it cannot be determined.
pub fn executable_timestamp() -> i64 {
    let modified = std::env::current_exe()
        .and_then(fs::metadata)
        .and_then(|meta| meta.modified());

    match modified {
        Ok(at) => unix_seconds_rounded(at),
        Err(err) => {
            tracing::debug!(error = %err, "executable mtime unavailable, using current time");
            OffsetDateTime::now_utc().unix_timestamp()
        }
    }
}

fn unix_seconds_rounded(at: SystemTime) -> i64 {
    let at = OffsetDateTime::from(at);
    at.unix_timestamp() + i64::from(at.nanosecond() >= 500_000_000)
}
