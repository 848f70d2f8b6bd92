//! `semdedup dedupe`: index records, then report duplicate groups.

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Instant;

use semdedup_core::dedupe::{DedupeParams, DuplicateFinder};
use semdedup_core::events::EventSink;
use semdedup_core::lifecycle::IndexMode;
use semdedup_core::similarity::MetaSignals;

use crate::build_cmd::{batch_sizes, index_records, require_embedder};
use crate::config::Config;
use crate::ingest::{self, InputSource};
use crate::meili::MeiliIndex;
use crate::report;

/// Command-line options for `dedupe`.
#[derive(Debug, Clone, Default)]
pub struct DedupeOptions {
    pub input: Option<PathBuf>,
    pub fs: Option<PathBuf>,
    pub output_json: Option<PathBuf>,
    pub mode: Option<IndexMode>,
    pub threshold: Option<f64>,
    pub top_k: Option<usize>,
    pub time_window: Option<f64>,
    pub check_time: bool,
    pub check_ctime: bool,
    pub check_mtime: bool,
    pub check_size: bool,
    pub json: bool,
}

impl DedupeOptions {
    /// `--check-time` turns on both timestamp signals.
    pub fn signals(&self) -> MetaSignals {
        let mut signals = if self.check_time {
            MetaSignals::time()
        } else {
            MetaSignals::none()
        };
        signals.ctime |= self.check_ctime;
        signals.mtime |= self.check_mtime;
        signals.size = self.check_size;
        signals
    }

    pub fn params(&self, config: &Config) -> DedupeParams {
        DedupeParams {
            threshold: self.threshold.unwrap_or(config.dedupe.threshold),
            top_k: self.top_k.unwrap_or(config.dedupe.top_k),
            signals: self.signals(),
            time_window: self.time_window.unwrap_or(config.dedupe.time_window_secs),
            embedder_key: config.index.embedder.clone(),
            max_length: config.embedding.max_length,
        }
    }
}

pub async fn run_dedupe(
    config: &Config,
    opts: DedupeOptions,
    events: &dyn EventSink,
) -> Result<()> {
    if opts.input.is_some() && opts.fs.is_some() {
        bail!("Cannot specify both --input and --fs.");
    }
    let mode = match opts.mode {
        Some(mode) => mode,
        None => config.indexing.index_mode()?,
    };
    if mode == IndexMode::Refine {
        bail!("dedupe supports --mode rebuild or append, not refine");
    }
    let params = opts.params(config);
    let batches = batch_sizes(config, None, None)?;

    let default_output = PathBuf::from("fs_scan.json");
    let default_input = config.indexing.input.clone();
    let source = match &opts.fs {
        Some(root) => InputSource::Scan {
            root,
            output: opts.output_json.as_deref().unwrap_or(&default_output),
            excludes: &config.dedupe.exclude_globs,
        },
        None => InputSource::File(opts.input.as_deref().unwrap_or(&default_input)),
    };
    let records = ingest::load_input(&source)?;
    if let InputSource::Scan { output, .. } = &source {
        eprintln!("Wrote scan output to {}", output.display());
    }
    if records.is_empty() {
        println!("No records to process.");
        return Ok(());
    }

    let embedder = require_embedder(config)?;
    let index = MeiliIndex::new(&config.index)?;
    let started = Instant::now();

    // Neighbor search must see every document, so writes always wait here.
    let outcome = index_records(
        config,
        &index,
        &embedder,
        events,
        records,
        mode,
        batches,
        true,
    )
    .await?;

    let finder = DuplicateFinder::new(&index, &embedder, events);
    let result = finder
        .find_duplicate_groups(&outcome.documents, &params)
        .await?;

    let mut stdout = std::io::stdout().lock();
    if opts.json {
        report::render_json(&result, &mut stdout)?;
    } else {
        report::render_text(&result, &mut stdout)?;
    }
    tracing::info!(
        groups = result.groups.len(),
        elapsed_secs = started.elapsed().as_secs_f64(),
        "dedupe finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_time_enables_both_timestamps() {
        let opts = DedupeOptions {
            check_time: true,
            ..Default::default()
        };
        assert_eq!(
            opts.signals(),
            MetaSignals {
                ctime: true,
                mtime: true,
                size: false
            }
        );
        let opts = DedupeOptions {
            check_mtime: true,
            check_size: true,
            ..Default::default()
        };
        assert_eq!(
            opts.signals(),
            MetaSignals {
                ctime: false,
                mtime: true,
                size: true
            }
        );
    }

    #[test]
    fn params_fall_back_to_config() {
        let mut config = Config::minimal();
        config.dedupe.top_k = 7;
        let opts = DedupeOptions {
            threshold: Some(0.5),
            ..Default::default()
        };
        let params = opts.params(&config);
        assert_eq!(params.threshold, 0.5);
        assert_eq!(params.top_k, 7);
        assert_eq!(params.time_window, 900.0);
        assert_eq!(params.embedder_key, "bge_m3");
    }
}
