//! Embedding providers.
//!
//! [`ConfiguredEmbedder`] implements the core
//! [`Embedder`](semdedup_core::embedding::Embedder) contract on top of one
//! of these backends, chosen by `embedding.provider`:
//!
//! | Config Value | Backend |
//! |-------------|---------|
//! | `"disabled"` | none; every non-empty encode fails |
//! | `"openai"` | `POST https://api.openai.com/v1/embeddings` (needs `OPENAI_API_KEY`) |
//! | `"ollama"` | `POST {url}/api/embed` (default `http://localhost:11434`) |
//! | `"local"` | fastembed, in-process; model downloaded once, then offline |
//!
//! # Retry Strategy
//!
//! The OpenAI and Ollama backends use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use semdedup_core::embedding::{check_batch, Embedder, EncodeOptions};

use crate::config::EmbeddingConfig;

/// The embedder described by an [`EmbeddingConfig`].
pub struct ConfiguredEmbedder {
    config: EmbeddingConfig,
    model: String,
    dims: usize,
    client: reqwest::Client,
    #[cfg(feature = "local-embeddings-fastembed")]
    local: std::sync::Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

impl ConfiguredEmbedder {
    /// Build the embedder for `config`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown providers, a missing model or
    /// dimension, a missing `OPENAI_API_KEY`, or an unknown local model.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = match config.provider.as_str() {
            "disabled" => ("disabled".to_string(), config.dims.unwrap_or(0)),
            "openai" => {
                if std::env::var("OPENAI_API_KEY").is_err() {
                    bail!("OPENAI_API_KEY environment variable not set");
                }
                required_model_and_dims(config, "OpenAI")?
            }
            "ollama" => required_model_and_dims(config, "Ollama")?,
            "local" => resolve_local_model(config)?,
            other => bail!("Unknown embedding provider: {}", other),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config: config.clone(),
            model,
            dims,
            client,
            #[cfg(feature = "local-embeddings-fastembed")]
            local: std::sync::Arc::new(std::sync::Mutex::new(None)),
        })
    }

    pub fn provider(&self) -> &str {
        &self.config.provider
    }

    async fn dispatch(&self, texts: &[String], opts: EncodeOptions) -> Result<Vec<Vec<f32>>> {
        match self.config.provider.as_str() {
            "openai" => {
                let mut out = Vec::with_capacity(texts.len());
                for chunk in texts.chunks(opts.batch_size.max(1)) {
                    out.extend(embed_openai(&self.client, &self.config, &self.model, chunk).await?);
                }
                Ok(out)
            }
            "ollama" => {
                let mut out = Vec::with_capacity(texts.len());
                for chunk in texts.chunks(opts.batch_size.max(1)) {
                    out.extend(embed_ollama(&self.client, &self.config, &self.model, chunk).await?);
                }
                Ok(out)
            }
            #[cfg(feature = "local-embeddings-fastembed")]
            "local" => self.embed_local(texts, opts).await,
            #[cfg(not(feature = "local-embeddings-fastembed"))]
            "local" => bail!(
                "Local embedding provider requires --features local-embeddings-fastembed"
            ),
            "disabled" => bail!("Embedding provider is disabled"),
            other => bail!("Unknown embedding provider: {}", other),
        }
    }

    /// Run the local model on a blocking thread, loading it on first use.
    #[cfg(feature = "local-embeddings-fastembed")]
    async fn embed_local(&self, texts: &[String], opts: EncodeOptions) -> Result<Vec<Vec<f32>>> {
        let fastembed_model = config_to_fastembed_model(&self.model)?;
        let slot = std::sync::Arc::clone(&self.local);
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
            if guard.is_none() {
                let model = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(fastembed_model)
                        .with_max_length(opts.max_length)
                        .with_show_download_progress(true),
                )
                .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;
                *guard = Some(model);
            }
            let model = guard
                .as_mut()
                .ok_or_else(|| anyhow!("local embedding model not loaded"))?;
            model
                .embed(texts, Some(opts.batch_size.max(1)))
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

#[async_trait]
impl Embedder for ConfiguredEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode(
        &self,
        texts: &[String],
        opts: EncodeOptions,
    ) -> semdedup_core::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self
            .dispatch(texts, opts)
            .await
            .map_err(|e| semdedup_core::Error::Encoding(format!("{e:#}")))?;
        check_batch(texts.len(), &vectors, self.dims)?;
        Ok(vectors)
    }
}

/// Embed a single query text.
pub async fn embed_query(
    embedder: &dyn Embedder,
    text: &str,
    max_length: usize,
) -> Result<Vec<f32>> {
    let opts = EncodeOptions {
        batch_size: 1,
        max_length,
    };
    embedder
        .encode(&[text.to_string()], opts)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Empty embedding response"))
}

fn required_model_and_dims(config: &EmbeddingConfig, label: &str) -> Result<(String, usize)> {
    let model = config
        .model
        .clone()
        .ok_or_else(|| anyhow!("embedding.model required for {} provider", label))?;
    let dims = config
        .dims
        .filter(|d| *d > 0)
        .ok_or_else(|| anyhow!("embedding.dims required for {} provider", label))?;
    Ok((model, dims))
}

// ============ HTTP Providers ============

/// POST `body` to `url`, retrying 429/5xx and network errors with backoff.
async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::debug!(
                        %status,
                        attempt,
                        "{} embedding request will be retried",
                        label
                    );
                    last_err = Some(anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }

                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} connection error ({}): {}", label, url, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} embedding failed after retries", label)))
}

async fn embed_openai(
    client: &reqwest::Client,
    config: &EmbeddingConfig,
    model: &str,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| anyhow!("OPENAI_API_KEY not set"))?;
    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });
    let json = post_json_with_retry(
        client,
        "https://api.openai.com/v1/embeddings",
        Some(&api_key),
        &body,
        config.max_retries,
        "OpenAI",
    )
    .await?;
    parse_openai_response(&json)
}

async fn embed_ollama(
    client: &reqwest::Client,
    config: &EmbeddingConfig,
    model: &str,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let base = config
        .url
        .as_deref()
        .unwrap_or("http://localhost:11434")
        .trim_end_matches('/');
    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });
    let json = post_json_with_retry(
        client,
        &format!("{}/api/embed", base),
        None,
        &body,
        config.max_retries,
        "Ollama",
    )
    .await?;
    parse_ollama_response(&json)
}

fn float_array(value: &serde_json::Value, what: &str) -> Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| anyhow!("Invalid {} response: embedding is not an array", what))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow!("Invalid {} response: non-numeric component", what))
        })
        .collect()
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .unwrap_or(pos as u64);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        indexed.push((index, float_array(embedding, "OpenAI")?));
    }
    indexed.sort_by_key(|(index, _)| *index);

    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?
        .iter()
        .map(|e| float_array(e, "Ollama"))
        .collect()
}

// ============ Local Provider ============

fn resolve_local_model(config: &EmbeddingConfig) -> Result<(String, usize)> {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| "multilingual-e5-large".to_string());

    let dims = config.dims.unwrap_or(match model_name.as_str() {
        "all-minilm-l6-v2" => 384,
        "bge-small-en-v1.5" => 384,
        "bge-base-en-v1.5" => 768,
        "bge-large-en-v1.5" => 1024,
        "multilingual-e5-small" => 384,
        "multilingual-e5-base" => 768,
        "multilingual-e5-large" => 1024,
        _ => 1024,
    });

    Ok((model_name, dims))
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ),
    }
}
