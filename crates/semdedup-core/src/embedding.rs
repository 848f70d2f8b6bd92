//! Embedding provider contract and vector utilities.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement,
//! plus pure helpers for batch validation and cosine similarity.
//!
//! Concrete providers (OpenAI, Ollama, fastembed) live in the `semdedup`
//! application crate.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Per-call encoding knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Texts per provider request.
    pub batch_size: usize,
    /// Token limit per text; longer inputs are truncated by the provider.
    pub max_length: usize,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            batch_size: 64,
            max_length: 128,
        }
    }
}

/// Maps text to fixed-dimension dense vectors.
///
/// Implementations must be deterministic for a fixed model configuration
/// and return exactly one vector of length [`dims`](Embedder::dims) per
/// input text, in input order. Empty input returns an empty batch.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"multilingual-e5-large"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1024`).
    fn dims(&self) -> usize;
    /// Encode a batch of texts.
    async fn encode(&self, texts: &[String], opts: EncodeOptions) -> Result<Vec<Vec<f32>>>;
}

/// Check that an encoded batch has one row per text and the expected width.
pub fn check_batch(expected_rows: usize, vectors: &[Vec<f32>], dims: usize) -> Result<()> {
    if vectors.len() != expected_rows {
        return Err(Error::Encoding(format!(
            "provider returned {} vectors for {} texts",
            vectors.len(),
            expected_rows
        )));
    }
    check_dims(vectors, dims)
}

/// Check that every vector has exactly `dims` components.
pub fn check_dims(vectors: &[Vec<f32>], dims: usize) -> Result<()> {
    match vectors.iter().find(|v| v.len() != dims) {
        Some(bad) => Err(Error::DimensionMismatch {
            expected: dims,
            actual: bad.len(),
        }),
        None => Ok(()),
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors, vectors of
/// different lengths, or when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
