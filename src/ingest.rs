//! Input loading.
//!
//! Reads records from a name list (`.txt` or anything not `.json`), a JSON
//! record array (`.json`), or a filesystem scan, and writes scans back out
//! in the JSON input format.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::Path;

use semdedup_core::models::ItemRecord;
use semdedup_core::records::{parse_name_list, records_from_value};

use crate::connector_fs;

/// Where `dedupe` takes its records from.
#[derive(Debug, Clone)]
pub enum InputSource<'a> {
    /// A name list or JSON record file.
    File(&'a Path),
    /// A directory scan, saved to `output` before indexing.
    Scan {
        root: &'a Path,
        output: &'a Path,
        excludes: &'a [String],
    },
}

/// Load records from the chosen source.
pub fn load_input(source: &InputSource<'_>) -> Result<Vec<ItemRecord>> {
    match source {
        InputSource::File(path) => load_records(path),
        InputSource::Scan {
            root,
            output,
            excludes,
        } => {
            let records = connector_fs::scan_filesystem(root, excludes)?;
            dump_records_json(&records, output)?;
            tracing::info!(
                records = records.len(),
                output = %output.display(),
                "scan saved"
            );
            Ok(records)
        }
    }
}

/// Load records from `path`, choosing the parser by extension.
///
/// # Errors
///
/// Returns an error when the file is missing or unreadable, or when a
/// `.json` file is not valid JSON.
pub fn load_records(path: &Path) -> Result<Vec<ItemRecord>> {
    if !path.exists() {
        bail!("Input file not found: {}", path.display());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;

    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if !is_json {
        return Ok(parse_name_list(&text));
    }

    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse JSON input: {}", path.display()))?;
    if !value.is_array() {
        tracing::warn!(path = %path.display(), "JSON input is not an array; no records loaded");
        return Ok(Vec::new());
    }
    Ok(records_from_value(&value))
}

#[derive(Serialize)]
struct DumpEntry<'a> {
    name: &'a str,
    path: Option<&'a str>,
    ctime: Option<f64>,
    mtime: Option<f64>,
    size: Option<u64>,
}

/// Write `records` as a pretty-printed JSON array readable by
/// [`load_records`].
pub fn dump_records_json(records: &[ItemRecord], path: &Path) -> Result<()> {
    let entries: Vec<DumpEntry<'_>> = records
        .iter()
        .map(|r| DumpEntry {
            name: &r.name,
            path: r.path.as_deref(),
            ctime: r.ctime,
            mtime: r.mtime,
            size: r.size,
        })
        .collect();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&entries)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
