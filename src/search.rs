//! `semdedup search`: one-shot semantic lookup against the index.

use anyhow::Result;

use semdedup_core::index::VectorIndex;

use crate::build_cmd::require_embedder;
use crate::config::Config;
use crate::embedding::embed_query;
use crate::meili::MeiliIndex;

/// Embed `query` and print the closest stored names, best first.
pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let query = query.trim();
    if query.is_empty() {
        println!("No results.");
        return Ok(());
    }

    let embedder = require_embedder(config)?;
    let index = MeiliIndex::new(&config.index)?;
    let limit = limit.unwrap_or(config.dedupe.top_k).max(1);

    let vector = embed_query(&embedder, query, config.embedding.max_length).await?;
    tracing::debug!(dims = vector.len(), "query encoded");
    let hits = index
        .search_by_vector(&vector, limit, &config.index.embedder)
        .await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    println!("Top {} results:", hits.len());
    for (rank, hit) in hits.iter().enumerate() {
        let id = hit
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!(
            "{}. [{}] {}",
            rank + 1,
            id,
            hit.name.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
