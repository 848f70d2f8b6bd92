//! In-memory [`VectorIndex`] implementation for tests and embedding the
//! engine without a search server.
//!
//! Uses a `BTreeMap` behind `std::sync::RwLock`. Nearest-neighbor search is
//! brute-force cosine similarity over all stored vectors. A few knobs let
//! tests simulate backend faults.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::{DocumentPayload, IndexedDocument, ItemRecord};

use super::{IndexSettings, SettingsOutcome, VectorIndex};

struct StoredDoc {
    record: ItemRecord,
    vector: Vec<f32>,
}

#[derive(Default)]
struct State {
    exists: bool,
    docs: BTreeMap<u64, StoredDoc>,
    settings: Option<IndexSettings>,
    written_batches: Vec<usize>,
}

/// In-memory vector index.
pub struct InMemoryIndex {
    uid: String,
    state: RwLock<State>,
    settings_supported: bool,
    failing_searches: AtomicUsize,
    fetch_calls: AtomicUsize,
    search_calls: AtomicUsize,
}

impl InMemoryIndex {
    /// An index handle whose backing index does not exist yet.
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            state: RwLock::new(State::default()),
            settings_supported: true,
            failing_searches: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
        }
    }

    /// An existing index pre-populated with `docs`.
    pub fn with_documents(uid: impl Into<String>, docs: Vec<IndexedDocument>) -> Self {
        let index = Self::new(uid);
        {
            let mut state = index.write_state();
            state.exists = true;
            for doc in docs {
                state.docs.insert(
                    doc.id,
                    StoredDoc {
                        record: doc.record,
                        vector: doc.vector,
                    },
                );
            }
        }
        index
    }

    /// Make settings reads and updates report as unsupported.
    pub fn without_settings_support(mut self) -> Self {
        self.settings_supported = false;
        self
    }

    /// The next `n` neighbor searches fail with `IndexUnavailable`.
    pub fn fail_next_searches(&self, n: usize) {
        self.failing_searches.store(n, Ordering::SeqCst);
    }

    pub fn exists(&self) -> bool {
        self.read_state().exists
    }

    /// Stored `(id, name)` pairs in id order.
    pub fn entries(&self) -> Vec<(u64, String)> {
        self.read_state()
            .docs
            .iter()
            .map(|(id, d)| (*id, d.record.name.clone()))
            .collect()
    }

    /// Stored record for `id`, if any.
    pub fn record(&self, id: u64) -> Option<ItemRecord> {
        self.read_state().docs.get(&id).map(|d| d.record.clone())
    }

    pub fn settings(&self) -> Option<IndexSettings> {
        self.read_state().settings.clone()
    }

    /// Sizes of every upsert batch received, in order.
    pub fn written_batches(&self) -> Vec<usize> {
        self.read_state().written_batches.clone()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn not_found(&self) -> Error {
        Error::IndexNotFound(self.uid.clone())
    }
}

fn payload(id: u64, record: &ItemRecord, fields: &[&str]) -> DocumentPayload {
    let wants = |f: &str| fields.is_empty() || fields.contains(&f);
    DocumentPayload {
        id: wants("id").then_some(id),
        name: wants("name").then(|| record.name.clone()),
        path: if wants("path") { record.path.clone() } else { None },
        ctime: if wants("ctime") { record.ctime } else { None },
        mtime: if wants("mtime") { record.mtime } else { None },
        size: if wants("size") { record.size } else { None },
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn uid(&self) -> &str {
        &self.uid
    }

    async fn create_or_get(&self) -> Result<()> {
        self.write_state().exists = true;
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        let mut state = self.write_state();
        if !state.exists {
            return Err(self.not_found());
        }
        *state = State::default();
        Ok(())
    }

    async fn ensure_settings(&self, desired: &IndexSettings) -> Result<SettingsOutcome> {
        if !self.settings_supported {
            return Ok(SettingsOutcome::Unsupported(
                "settings endpoint not available".to_string(),
            ));
        }
        let mut state = self.write_state();
        if !state.exists {
            return Err(self.not_found());
        }
        let mut changed = Vec::new();
        match &state.settings {
            Some(current) => {
                if current.embedder != desired.embedder || current.dimensions != desired.dimensions
                {
                    changed.push("embedders".to_string());
                }
                if current.searchable != desired.searchable {
                    changed.push("searchableAttributes".to_string());
                }
                if current.displayed != desired.displayed {
                    changed.push("displayedAttributes".to_string());
                }
            }
            None => changed.extend(
                ["embedders", "searchableAttributes", "displayedAttributes"]
                    .iter()
                    .map(|s| s.to_string()),
            ),
        }
        if changed.is_empty() {
            return Ok(SettingsOutcome::Unchanged);
        }
        state.settings = Some(desired.clone());
        Ok(SettingsOutcome::Updated(changed))
    }

    async fn upsert_batch(
        &self,
        docs: &[IndexedDocument],
        _embedder: &str,
        _wait: bool,
    ) -> Result<()> {
        let mut state = self.write_state();
        if let Some(settings) = &state.settings {
            if let Some(bad) = docs.iter().find(|d| d.vector.len() != settings.dimensions) {
                return Err(Error::DimensionMismatch {
                    expected: settings.dimensions,
                    actual: bad.vector.len(),
                });
            }
        }
        // Writing to a missing index creates it, like the real backend.
        state.exists = true;
        for doc in docs {
            state.docs.insert(
                doc.id,
                StoredDoc {
                    record: doc.record.clone(),
                    vector: doc.vector.clone(),
                },
            );
        }
        state.written_batches.push(docs.len());
        Ok(())
    }

    async fn fetch_page(
        &self,
        fields: &[&str],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<DocumentPayload>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.read_state();
        if !state.exists {
            return Err(self.not_found());
        }
        Ok(state
            .docs
            .iter()
            .skip(offset)
            .take(limit)
            .map(|(id, d)| payload(*id, &d.record, fields))
            .collect())
    }

    async fn search_by_vector(
        &self,
        vector: &[f32],
        limit: usize,
        _embedder: &str,
    ) -> Result<Vec<DocumentPayload>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_searches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(Error::IndexUnavailable("simulated search failure".into()));
        }

        let state = self.read_state();
        if !state.exists {
            return Err(self.not_found());
        }
        let mut scored: Vec<(f32, u64)> = state
            .docs
            .iter()
            .map(|(id, d)| (cosine_similarity(vector, &d.vector), *id))
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        Ok(scored
            .into_iter()
            .take(limit)
            .filter_map(|(_, id)| state.docs.get(&id).map(|d| payload(id, &d.record, &[])))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: u64, name: &str, vector: Vec<f32>) -> IndexedDocument {
        IndexedDocument {
            id,
            record: ItemRecord::named(name),
            vector,
        }
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let index = InMemoryIndex::new("games");
        let err = index.delete().await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn settings_second_call_is_noop() {
        let index = InMemoryIndex::new("games");
        index.create_or_get().await.unwrap();
        let settings = IndexSettings::new("e", 2, &["id", "name"]);
        let first = index.ensure_settings(&settings).await.unwrap();
        assert!(matches!(first, SettingsOutcome::Updated(ref f) if f.len() == 3));
        let second = index.ensure_settings(&settings).await.unwrap();
        assert_eq!(second, SettingsOutcome::Unchanged);

        let wider = IndexSettings::new("e", 2, &["id", "name", "size"]);
        let third = index.ensure_settings(&wider).await.unwrap();
        assert_eq!(
            third,
            SettingsOutcome::Updated(vec!["displayedAttributes".to_string()])
        );
    }

    #[tokio::test]
    async fn search_ranks_by_cosine() {
        let index = InMemoryIndex::with_documents(
            "games",
            vec![
                doc(1, "a", vec![1.0, 0.0]),
                doc(2, "b", vec![0.0, 1.0]),
                doc(3, "c", vec![0.7, 0.7]),
            ],
        );
        let hits = index.search_by_vector(&[1.0, 0.1], 2, "e").await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![Some(1), Some(3)]);
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimension() {
        let index = InMemoryIndex::new("games");
        index.create_or_get().await.unwrap();
        index
            .ensure_settings(&IndexSettings::new("e", 3, &["id"]))
            .await
            .unwrap();
        let err = index
            .upsert_batch(&[doc(1, "a", vec![1.0])], "e", true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 1 }));
    }

    #[tokio::test]
    async fn injected_search_failures_run_out() {
        let index = InMemoryIndex::with_documents("games", vec![doc(1, "a", vec![1.0])]);
        index.fail_next_searches(1);
        assert!(index.search_by_vector(&[1.0], 5, "e").await.is_err());
        assert_eq!(index.search_by_vector(&[1.0], 5, "e").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fetch_respects_fields() {
        let mut record = ItemRecord::named("a");
        record.size = Some(5);
        let index = InMemoryIndex::with_documents(
            "games",
            vec![IndexedDocument {
                id: 1,
                record,
                vector: vec![1.0],
            }],
        );
        let page = index.fetch_page(&["name"], 0, 10).await.unwrap();
        assert_eq!(page[0].id, None);
        assert_eq!(page[0].name.as_deref(), Some("a"));
        assert_eq!(page[0].size, None);
    }
}
