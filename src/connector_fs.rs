//! Filesystem scanner.
//!
//! Walks a directory tree and turns every regular file into an
//! [`ItemRecord`] named after the file, carrying its full path, size, and
//! timestamps (epoch seconds). Paths matching an exclude glob (relative to
//! the root) are skipped, as are files whose names are not valid UTF-8.

use anyhow::{anyhow, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use std::time::SystemTime;
use walkdir::WalkDir;

use semdedup_core::models::ItemRecord;

/// Scan `root` recursively.
///
/// A missing root logs a warning and yields no records. Entries that
/// cannot be read are logged at debug level and skipped. Output is sorted
/// by path.
///
/// # Errors
///
/// Returns an error only for invalid exclude patterns.
pub fn scan_filesystem(root: &Path, exclude_globs: &[String]) -> Result<Vec<ItemRecord>> {
    let exclude_set = build_globset(exclude_globs)?;

    if !root.exists() {
        tracing::warn!(root = %root.display(), "scan root does not exist");
        return Ok(Vec::new());
    }

    let mut items = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude_set.is_match(relative) {
            continue;
        }

        match file_to_record(path) {
            Ok(item) => items.push(item),
            Err(e) => tracing::debug!(path = %path.display(), error = %e, "skipping file"),
        }
    }

    // Sort for deterministic ordering
    items.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(items)
}

fn file_to_record(path: &Path) -> Result<ItemRecord> {
    let metadata = std::fs::metadata(path)?;
    // Non-UTF-8 names are skipped, never lossily converted.
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("file name is not valid UTF-8"))?
        .to_string();

    let mut record = ItemRecord::named(name);
    record.path = Some(path.display().to_string());
    record.size = Some(metadata.len());
    record.mtime = metadata.modified().ok().and_then(epoch_secs);
    record.ctime = change_time(&metadata);
    Ok(record)
}

fn epoch_secs(t: SystemTime) -> Option<f64> {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs_f64())
}

/// Inode change time on unix, creation time elsewhere.
#[cfg(unix)]
fn change_time(metadata: &std::fs::Metadata) -> Option<f64> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.ctime() as f64 + metadata.ctime_nsec() as f64 / 1e9)
}

#[cfg(not(unix))]
fn change_time(metadata: &std::fs::Metadata) -> Option<f64> {
    metadata.created().ok().and_then(epoch_secs)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
