//! Duplicate detection over freshly indexed documents.
//!
//! For every document written in the current run, the finder asks the
//! index for its nearest neighbors, scores each unordered pair once, keeps
//! pairs whose composite score reaches the threshold, and groups the kept
//! pairs with union-find.
//!
//! Neighbors that were not part of this run are rebuilt from the hit
//! payload (tagged [`Provenance::Existing`](crate::models::Provenance)) and
//! re-embedded by name. The name cache lives for one call, so each distinct
//! name is embedded at most once per run.
//!
//! A failed neighbor search skips that document and is reported as a
//! warning event. A hit with no id or no name is ignored.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::cluster::Clusterer;
use crate::embedding::{check_batch, Embedder, EncodeOptions};
use crate::error::{Error, Result};
use crate::events::{Event, EventSink};
use crate::index::VectorIndex;
use crate::models::{DuplicateGroup, IndexedDocument, ItemRecord, SimilarityEdge};
use crate::similarity::{composite, meta_scores, semantic_similarity, MetaSignals};

/// Knobs for one duplicate search.
#[derive(Debug, Clone)]
pub struct DedupeParams {
    /// Minimum composite score for a pair to count as a duplicate.
    pub threshold: f64,
    /// Neighbors requested per document, including the document itself.
    pub top_k: usize,
    pub signals: MetaSignals,
    /// Seconds over which the time signals decay to zero.
    pub time_window: f64,
    /// Embedder name registered on the index.
    pub embedder_key: String,
    /// Token limit used when re-embedding existing names.
    pub max_length: usize,
}

impl Default for DedupeParams {
    fn default() -> Self {
        Self {
            threshold: 0.85,
            top_k: 10,
            signals: MetaSignals::none(),
            time_window: 900.0,
            embedder_key: "default".to_string(),
            max_length: 128,
        }
    }
}

impl DedupeParams {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::Config(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if self.top_k == 0 {
            return Err(Error::Config("top_k must be >= 1".to_string()));
        }
        if !self.time_window.is_finite() || self.time_window < 0.0 {
            return Err(Error::Config(format!(
                "time window must be a non-negative number of seconds, got {}",
                self.time_window
            )));
        }
        Ok(())
    }
}

/// Result of [`DuplicateFinder::find_duplicate_groups`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct DedupeReport {
    /// Groups ordered by descending size.
    pub groups: Vec<DuplicateGroup>,
    /// Documents whose neighbors were searched.
    pub items: usize,
    /// Accepted pairs across all groups.
    pub edges: usize,
    /// Documents skipped because their neighbor search failed.
    pub failed_searches: usize,
}

/// Scores neighbor pairs and clusters duplicates.
pub struct DuplicateFinder<'a> {
    index: &'a dyn VectorIndex,
    embedder: &'a dyn Embedder,
    events: &'a dyn EventSink,
}

impl<'a> DuplicateFinder<'a> {
    pub fn new(
        index: &'a dyn VectorIndex,
        embedder: &'a dyn Embedder,
        events: &'a dyn EventSink,
    ) -> Self {
        Self {
            index,
            embedder,
            events,
        }
    }

    /// Find duplicate groups among `items` and their indexed neighbors.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] for an out-of-range threshold, `top_k == 0`, or
    ///   a negative time window.
    /// - Embedding failures while re-embedding an existing neighbor's name.
    ///
    /// Neighbor search failures never fail the call.
    pub async fn find_duplicate_groups(
        &self,
        items: &[IndexedDocument],
        params: &DedupeParams,
    ) -> Result<DedupeReport> {
        params.validate()?;

        let mut records: HashMap<u64, ItemRecord> = HashMap::with_capacity(items.len());
        let mut vectors: HashMap<u64, Vec<f32>> = HashMap::with_capacity(items.len());
        for doc in items {
            records.insert(doc.id, doc.record.clone());
            vectors.insert(doc.id, doc.vector.clone());
        }

        let mut name_cache: HashMap<String, Vec<f32>> = HashMap::new();
        let mut seen: HashSet<(u64, u64)> = HashSet::new();
        let mut clusterer = Clusterer::new();
        let mut failed_searches = 0;

        self.events.emit(Event::SearchStarted {
            items: items.len(),
            threshold: params.threshold,
            top_k: params.top_k,
        });

        for doc in items {
            let hits = match self
                .index
                .search_by_vector(&doc.vector, params.top_k, &params.embedder_key)
                .await
            {
                Ok(hits) => hits,
                Err(e) => {
                    failed_searches += 1;
                    self.events.emit(Event::NeighborSearchFailed {
                        id: doc.id,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            for hit in hits {
                let Some(hit_id) = hit.id else {
                    continue;
                };
                if hit_id == doc.id {
                    continue;
                }
                let pair = (doc.id.min(hit_id), doc.id.max(hit_id));
                if !seen.insert(pair) {
                    continue;
                }

                if !records.contains_key(&hit_id) {
                    let Some(record) = ItemRecord::from_payload(&hit) else {
                        continue;
                    };
                    let vector = self
                        .vector_for_name(&record.name, &mut name_cache, params)
                        .await?;
                    records.insert(hit_id, record);
                    vectors.insert(hit_id, vector);
                }

                let (a, b) = pair;
                let (Some(rec_a), Some(rec_b)) = (records.get(&a), records.get(&b)) else {
                    continue;
                };
                let (Some(vec_a), Some(vec_b)) = (vectors.get(&a), vectors.get(&b)) else {
                    continue;
                };

                let semantic = semantic_similarity(vec_a, vec_b);
                let meta = meta_scores(rec_a, rec_b, params.signals, params.time_window);
                let score = composite(semantic, &meta);
                if score < params.threshold {
                    continue;
                }
                clusterer.accept(SimilarityEdge {
                    a,
                    b,
                    composite: score,
                    semantic,
                    meta_scores: meta,
                });
            }
        }

        let edges = clusterer.edge_count();
        let groups = clusterer.into_groups(&records);
        self.events.emit(Event::GroupsFound {
            groups: groups.len(),
            edges,
        });

        Ok(DedupeReport {
            groups,
            items: items.len(),
            edges,
            failed_searches,
        })
    }

    async fn vector_for_name(
        &self,
        name: &str,
        cache: &mut HashMap<String, Vec<f32>>,
        params: &DedupeParams,
    ) -> Result<Vec<f32>> {
        if let Some(v) = cache.get(name) {
            return Ok(v.clone());
        }
        let texts = vec![name.to_string()];
        let opts = EncodeOptions {
            batch_size: 1,
            max_length: params.max_length,
        };
        let mut vectors = self.embedder.encode(&texts, opts).await?;
        check_batch(1, &vectors, self.embedder.dims())?;
        let vector = vectors.pop().unwrap_or_default();
        cache.insert(name.to_string(), vector.clone());
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{NullSink, RecordingSink};
    use crate::index::memory::InMemoryIndex;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds by table lookup and counts calls.
    struct TableEmbedder {
        table: HashMap<String, Vec<f32>>,
        calls: AtomicUsize,
    }

    impl TableEmbedder {
        fn new(entries: &[(&str, [f32; 2])]) -> Self {
            Self {
                table: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_vec()))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for TableEmbedder {
        fn model_name(&self) -> &str {
            "table"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn encode(&self, texts: &[String], _opts: EncodeOptions) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            texts
                .iter()
                .map(|t| {
                    self.table
                        .get(t)
                        .cloned()
                        .ok_or_else(|| Error::Encoding(format!("no vector for {t}")))
                })
                .collect()
        }
    }

    fn doc(id: u64, name: &str, vector: [f32; 2]) -> IndexedDocument {
        IndexedDocument {
            id,
            record: ItemRecord::named(name),
            vector: vector.to_vec(),
        }
    }

    #[tokio::test]
    async fn rejects_bad_params() {
        let index = InMemoryIndex::new("t");
        let embedder = TableEmbedder::new(&[]);
        let finder = DuplicateFinder::new(&index, &embedder, &NullSink);
        for params in [
            DedupeParams {
                threshold: 1.5,
                ..Default::default()
            },
            DedupeParams {
                top_k: 0,
                ..Default::default()
            },
        ] {
            let err = finder.find_duplicate_groups(&[], &params).await.unwrap_err();
            assert!(matches!(err, Error::Config(_)));
        }
    }

    #[tokio::test]
    async fn existing_neighbors_are_reembedded_once_per_name() {
        let existing = vec![doc(1, "Zelda", [1.0, 0.0]), doc(2, "Zelda", [1.0, 0.0])];
        let fresh = doc(3, "Zelda!", [1.0, 0.0]);
        let mut all = existing.clone();
        all.push(fresh.clone());
        let index = InMemoryIndex::with_documents("t", all);
        let embedder = TableEmbedder::new(&[("Zelda", [1.0, 0.0])]);
        let finder = DuplicateFinder::new(&index, &embedder, &NullSink);

        let report = finder
            .find_duplicate_groups(&[fresh], &DedupeParams::default())
            .await
            .unwrap();

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.groups.len(), 1);
        let group = &report.groups[0];
        assert_eq!(group.member_ids(), vec![1, 2, 3]);
        assert_eq!(
            group.members[0].record.source,
            crate::models::Provenance::Existing
        );
        assert_eq!(group.members[2].record.source, crate::models::Provenance::New);
    }

    #[tokio::test]
    async fn failed_search_skips_item_and_warns() {
        let items = vec![doc(1, "a", [1.0, 0.0]), doc(2, "b", [1.0, 0.0])];
        let index = InMemoryIndex::with_documents("t", items.clone());
        index.fail_next_searches(1);
        let embedder = TableEmbedder::new(&[]);
        let sink = RecordingSink::new();
        let finder = DuplicateFinder::new(&index, &embedder, &sink);

        let report = finder
            .find_duplicate_groups(&items, &DedupeParams::default())
            .await
            .unwrap();

        assert_eq!(report.failed_searches, 1);
        // Item 2's own search still finds item 1.
        assert_eq!(report.groups.len(), 1);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, Event::NeighborSearchFailed { id: 1, .. })));
    }

    #[tokio::test]
    async fn each_pair_scored_once() {
        let items = vec![doc(1, "a", [1.0, 0.0]), doc(2, "b", [1.0, 0.0])];
        let index = InMemoryIndex::with_documents("t", items.clone());
        let embedder = TableEmbedder::new(&[]);
        let finder = DuplicateFinder::new(&index, &embedder, &NullSink);

        let report = finder
            .find_duplicate_groups(&items, &DedupeParams::default())
            .await
            .unwrap();
        assert_eq!(report.edges, 1);
        assert_eq!(report.groups[0].edges[0].a, 1);
        assert_eq!(report.groups[0].edges[0].b, 2);
    }

    #[tokio::test]
    async fn empty_input_yields_no_groups() {
        let index = InMemoryIndex::new("t");
        let embedder = TableEmbedder::new(&[]);
        let finder = DuplicateFinder::new(&index, &embedder, &NullSink);
        let report = finder
            .find_duplicate_groups(&[], &DedupeParams::default())
            .await
            .unwrap();
        assert!(report.groups.is_empty());
        assert_eq!(index.search_calls(), 0);
    }
}
