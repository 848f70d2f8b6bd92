//! Configuration parsing and validation.
//!
//! Configuration is a TOML file (default `config/semdedup.toml`). Every
//! section and key has a default, so an empty file is valid as long as the
//! embedding provider stays `disabled`.
//!
//! # Example
//!
//! ```toml
//! [index]
//! url = "http://127.0.0.1:7700"
//! api_key = "masterKey"
//! uid = "games"
//! embedder = "bge_m3"
//!
//! [embedding]
//! provider = "local"
//! model = "multilingual-e5-large"
//! dims = 1024
//! max_length = 128
//!
//! [indexing]
//! mode = "rebuild"
//! write_batch_size = 256
//! input = "games.txt"
//!
//! [dedupe]
//! threshold = 0.85
//! top_k = 10
//! time_window_secs = 900
//! ```
//!
//! `MEILI_API_KEY` in the environment overrides `index.api_key`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use semdedup_core::lifecycle::IndexMode;

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub dedupe: DedupeConfig,
}

/// Vector-search backend connection.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_uid")]
    pub uid: String,
    /// Embedder name registered on the index; also the `_vectors` key.
    #[serde(default = "default_embedder_key")]
    pub embedder: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            api_key: None,
            uid: default_uid(),
            embedder: default_embedder_key(),
            page_size: default_page_size(),
            task_timeout_secs: default_task_timeout_secs(),
        }
    }
}

fn default_url() -> String {
    "http://127.0.0.1:7700".to_string()
}
fn default_uid() -> String {
    "games".to_string()
}
fn default_embedder_key() -> String {
    "bge_m3".to_string()
}
fn default_page_size() -> usize {
    1000
}
fn default_task_timeout_secs() -> u64 {
    60
}

impl IndexConfig {
    /// The API key, preferring `MEILI_API_KEY` from the environment.
    pub fn resolved_api_key(&self) -> Option<String> {
        std::env::var("MEILI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.api_key.clone())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Ollama endpoint.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_length: default_max_length(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_length() -> usize {
    128
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_write_batch_size")]
    pub write_batch_size: usize,
    #[serde(default = "default_input")]
    pub input: PathBuf,
    /// Wait for each write batch to be persisted.
    #[serde(default = "default_wait")]
    pub wait: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            write_batch_size: default_write_batch_size(),
            input: default_input(),
            wait: default_wait(),
        }
    }
}

fn default_mode() -> String {
    "rebuild".to_string()
}
fn default_write_batch_size() -> usize {
    256
}
fn default_input() -> PathBuf {
    PathBuf::from("games.txt")
}
fn default_wait() -> bool {
    true
}

impl IndexingConfig {
    pub fn index_mode(&self) -> Result<IndexMode> {
        Ok(self.mode.parse::<IndexMode>()?)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DedupeConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_time_window_secs")]
    pub time_window_secs: f64,
    /// Glob patterns skipped by `--fs` scans.
    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            top_k: default_top_k(),
            time_window_secs: default_time_window_secs(),
            exclude_globs: default_exclude_globs(),
        }
    }
}

fn default_threshold() -> f64 {
    0.85
}
fn default_top_k() -> usize {
    10
}
fn default_time_window_secs() -> f64 {
    900.0
}
fn default_exclude_globs() -> Vec<String> {
    vec!["**/.git/**".to_string()]
}

impl Config {
    /// Defaults for every section; used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate index
    if config.index.uid.trim().is_empty() {
        bail!("index.uid must not be empty");
    }
    if config.index.embedder.trim().is_empty() {
        bail!("index.embedder must not be empty");
    }
    if config.index.page_size == 0 {
        bail!("index.page_size must be >= 1");
    }
    if config.index.task_timeout_secs == 0 {
        bail!("index.task_timeout_secs must be >= 1");
    }

    // Validate indexing
    config.indexing.index_mode()?;
    if config.indexing.write_batch_size == 0 {
        bail!("indexing.write_batch_size must be >= 1");
    }

    // Validate dedupe
    if !(0.0..=1.0).contains(&config.dedupe.threshold) {
        bail!("dedupe.threshold must be in [0.0, 1.0]");
    }
    if config.dedupe.top_k == 0 {
        bail!("dedupe.top_k must be >= 1");
    }
    if config.dedupe.time_window_secs.is_nan() || config.dedupe.time_window_secs < 0.0 {
        bail!("dedupe.time_window_secs must be >= 0");
    }

    // Validate embedding
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be >= 1");
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }
    // The local provider falls back to its built-in model table.
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama") {
        if config.embedding.dims.is_none() {
            bail!(
                "embedding.dims must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    Ok(())
}
