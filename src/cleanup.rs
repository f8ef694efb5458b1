//! Cleanup pass removing zero-byte artifacts after a batch run

use crate::error::Result;
use std::path::Path;
use tracing::{debug, info, warn};

/// Remove every zero-byte regular file directly under `directory`
///
/// The scan is not recursive. Removal failures are logged as warnings and
/// skipped. A missing directory yields an empty list. Returns the removed file
/// names, sorted.
pub async fn clean_empty_artifacts(directory: &Path) -> Result<Vec<String>> {
    use tokio::fs;

    if fs::metadata(directory).await.is_err() {
        debug!(?directory, "output directory does not exist, skipping cleanup");
        return Ok(Vec::new());
    }

    let mut entries = fs::read_dir(directory).await?;
    let mut empty_files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let file_type = match entry.file_type().await {
            Ok(ft) => ft,
            Err(e) => {
                warn!(path = ?entry.path(), error = %e, "failed to read entry type during cleanup");
                continue;
            }
        };
        if !file_type.is_file() {
            continue;
        }

        match entry.metadata().await {
            Ok(metadata) if metadata.len() == 0 => empty_files.push(entry.path()),
            Ok(_) => {}
            Err(e) => {
                warn!(path = ?entry.path(), error = %e, "failed to stat file during cleanup");
            }
        }
    }

    let mut removed = Vec::with_capacity(empty_files.len());
    for path in &empty_files {
        match fs::remove_file(path).await {
            Ok(()) => {
                debug!(?path, "removed empty artifact");
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    removed.push(name.to_string());
                }
            }
            Err(e) => {
                warn!(?path, error = %e, "failed to remove empty artifact");
            }
        }
    }
    removed.sort();

    info!(?directory, removed = removed.len(), "cleanup complete");
    Ok(removed)
}
