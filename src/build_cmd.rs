//! `semdedup build`: index a record file under rebuild / append / refine.

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Instant;

use semdedup_core::embedding::Embedder;
use semdedup_core::events::EventSink;
use semdedup_core::lifecycle::{
    BatchSizes, IndexMode, IndexOutcome, LifecycleManager, LifecycleOptions, DISPLAYED_FIELDS,
};
use semdedup_core::models::ItemRecord;

use crate::config::Config;
use crate::embedding::ConfiguredEmbedder;
use crate::ingest;
use crate::meili::MeiliIndex;
use crate::progress::format_number;

/// Command-line overrides for `build`.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub mode: Option<IndexMode>,
    pub input: Option<PathBuf>,
    pub write_batch: Option<usize>,
    pub embed_batch: Option<usize>,
}

/// Lifecycle settings derived from the config file.
pub fn lifecycle_options(config: &Config, wait: bool) -> LifecycleOptions {
    LifecycleOptions {
        embedder_key: config.index.embedder.clone(),
        displayed: DISPLAYED_FIELDS.iter().map(|s| s.to_string()).collect(),
        page_size: config.index.page_size,
        wait,
        max_length: config.embedding.max_length,
    }
}

/// Batch sizes from config, with optional overrides.
pub fn batch_sizes(
    config: &Config,
    embed: Option<usize>,
    write: Option<usize>,
) -> Result<BatchSizes> {
    let sizes = BatchSizes {
        embed: embed.unwrap_or(config.embedding.batch_size),
        write: write.unwrap_or(config.indexing.write_batch_size),
    };
    if sizes.embed == 0 || sizes.write == 0 {
        bail!("batch sizes must be >= 1");
    }
    Ok(sizes)
}

/// The configured embedder; fails when the provider is disabled.
pub fn require_embedder(config: &Config) -> Result<ConfiguredEmbedder> {
    if !config.embedding.is_enabled() {
        bail!("This command requires embeddings. Set [embedding] provider in config.");
    }
    let embedder = ConfiguredEmbedder::from_config(&config.embedding)?;
    tracing::debug!(
        provider = embedder.provider(),
        model = embedder.model_name(),
        dims = embedder.dims(),
        "embedder ready"
    );
    Ok(embedder)
}

/// Index `records` through the lifecycle manager.
#[allow(clippy::too_many_arguments)]
pub async fn index_records(
    config: &Config,
    index: &MeiliIndex,
    embedder: &ConfiguredEmbedder,
    events: &dyn EventSink,
    records: Vec<ItemRecord>,
    mode: IndexMode,
    batches: BatchSizes,
    wait: bool,
) -> Result<IndexOutcome> {
    let manager = LifecycleManager::new(index, embedder, events, lifecycle_options(config, wait));
    Ok(manager.index_records(records, mode, batches).await?)
}

pub async fn run_build(config: &Config, opts: BuildOptions, events: &dyn EventSink) -> Result<()> {
    let mode = match opts.mode {
        Some(mode) => mode,
        None => config.indexing.index_mode()?,
    };
    let batches = batch_sizes(config, opts.embed_batch, opts.write_batch)?;

    let records = if mode == IndexMode::Refine {
        if opts.input.is_some() {
            bail!("--input cannot be used with --mode refine; refine reads names from the index");
        }
        Vec::new()
    } else {
        let input = opts.input.unwrap_or_else(|| config.indexing.input.clone());
        let records = ingest::load_records(&input)?;
        tracing::info!(records = records.len(), input = %input.display(), "input loaded");
        records
    };

    let embedder = require_embedder(config)?;
    let index = MeiliIndex::new(&config.index)?;

    let started = Instant::now();
    let outcome = index_records(
        config,
        &index,
        &embedder,
        events,
        records,
        mode,
        batches,
        config.indexing.wait,
    )
    .await?;

    println!(
        "Indexed {} documents into '{}' (mode={}, start id={}) in {:.2}s",
        format_number(outcome.written as u64),
        config.index.uid,
        mode,
        outcome.start_id,
        started.elapsed().as_secs_f64()
    );
    Ok(())
}
