use crate::config::WatcherConfig;
use crate::core::{Result, SyncError};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info};

/// What happened to a processed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Archived(PathBuf),
    Deleted,
}

const MAX_NAME_COLLISIONS: u32 = 1000;

/// `{stem}_{yyyyMMdd_HHmmss}{.ext}`
pub fn archive_file_name(path: &Path, at: DateTime<Utc>) -> Result<String> {
    numbered_archive_name(path, at, 0)
}

/// Like [`archive_file_name`]; a non-zero `n` adds `_{n}` after the timestamp.
fn numbered_archive_name(path: &Path, at: DateTime<Utc>, n: u32) -> Result<String> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| SyncError::Io(format!("invalid file name '{}'", path.display())))?;
    let mut base = format!("{stem}_{}", at.format("%Y%m%d_%H%M%S"));
    if n > 0 {
        base.push_str(&format!("_{n}"));
    }
    Ok(match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{base}.{ext}"),
        None => base,
    })
}

/// Archives or deletes a successfully processed file.
///
/// When the move into the archive fails the original is deleted so it is not picked
/// up again; only a failing delete is returned as an error.
pub async fn dispose(path: &Path, watcher: &WatcherConfig, at: DateTime<Utc>) -> Result<Disposition> {
    if watcher.archive_processed_files && !watcher.archive_path.as_os_str().is_empty() {
        match move_to_archive(path, &watcher.archive_path, at).await {
            Ok(target) => {
                info!(
                    watcher = %watcher.name,
                    file = %path.display(),
                    archived = %target.display(),
                    "file archived"
                );
                return Ok(Disposition::Archived(target));
            }
            Err(err) => {
                error!(
                    watcher = %watcher.name,
                    file = %path.display(),
                    error = %err,
                    "archiving failed, deleting file instead"
                );
            }
        }
    }

    fs::remove_file(path).await?;
    info!(watcher = %watcher.name, file = %path.display(), "file deleted");
    Ok(Disposition::Deleted)
}

async fn move_to_archive(path: &Path, archive_dir: &Path, at: DateTime<Utc>) -> Result<PathBuf> {
    fs::create_dir_all(archive_dir).await?;
    for n in 0..MAX_NAME_COLLISIONS {
        let target = archive_dir.join(numbered_archive_name(path, at, n)?);
        // rename would silently replace an earlier archive of the same name
        if fs::try_exists(&target).await? {
            continue;
        }
        fs::rename(path, &target).await?;
        return Ok(target);
    }
    Err(SyncError::Io(format!(
        "no free archive name for '{}' in '{}'",
        path.display(),
        archive_dir.display()
    )))
}
