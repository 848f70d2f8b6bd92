//! Index lifecycle: mode resolution, id allocation, and batched
//! embed-then-write.
//!
//! # Modes
//!
//! | Mode | Index | Input | Ids |
//! |------|-------|-------|-----|
//! | `rebuild` | deleted (if present) and recreated | caller's records | `1..=N` |
//! | `append` | kept | caller's records minus names already indexed | `max + 1 ..` |
//! | `refine` | read, then deleted and recreated | the index's own names, deduplicated | `1..=N` |
//!
//! Embedding and writing use two independent batch sizes: at most
//! `embed` texts go to the embedder per call, at most `write` documents go
//! to the index per upsert. Partial trailing batches are flushed at the end.
//!
//! Append-mode id allocation reads the current maximum and then writes with
//! no locking; two writers against the same index can allocate the same
//! ids. Callers must serialize writes per index.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::embedding::{check_batch, Embedder, EncodeOptions};
use crate::error::{Error, Result};
use crate::events::{Event, EventSink};
use crate::index::{DocumentPages, IndexSettings, SettingsOutcome, VectorIndex};
use crate::models::{IndexedDocument, ItemRecord};
use crate::records::{dedupe_by_name, dedupe_names};

/// Fields the index returns for stored documents.
pub const DISPLAYED_FIELDS: [&str; 6] = ["id", "name", "path", "ctime", "mtime", "size"];

/// How the index is prepared before writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    Rebuild,
    Append,
    Refine,
}

impl FromStr for IndexMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rebuild" => Ok(IndexMode::Rebuild),
            "append" => Ok(IndexMode::Append),
            "refine" => Ok(IndexMode::Refine),
            other => Err(Error::Config(format!(
                "unknown index mode '{other}'. Use rebuild, append, or refine."
            ))),
        }
    }
}

impl fmt::Display for IndexMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexMode::Rebuild => f.write_str("rebuild"),
            IndexMode::Append => f.write_str("append"),
            IndexMode::Refine => f.write_str("refine"),
        }
    }
}

/// Independent batch sizes for embedding calls and index writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSizes {
    pub embed: usize,
    pub write: usize,
}

impl Default for BatchSizes {
    fn default() -> Self {
        Self {
            embed: 64,
            write: 256,
        }
    }
}

/// Settings that stay fixed for one manager.
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Embedder name registered on the index; also the vector field key.
    pub embedder_key: String,
    /// Attributes the index should return.
    pub displayed: Vec<String>,
    /// Page size for reading existing documents.
    pub page_size: usize,
    /// Wait for each write to be persisted before continuing.
    pub wait: bool,
    /// Token limit passed to the embedder.
    pub max_length: usize,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            embedder_key: "default".to_string(),
            displayed: DISPLAYED_FIELDS.iter().map(|s| s.to_string()).collect(),
            page_size: 1000,
            wait: true,
            max_length: 128,
        }
    }
}

/// What an indexing run did.
#[derive(Debug, Clone, Default)]
pub struct IndexOutcome {
    /// Documents written.
    pub written: usize,
    /// First id assigned (or that would have been assigned when nothing
    /// was written).
    pub start_id: u64,
    /// The written documents, in id order.
    pub documents: Vec<IndexedDocument>,
}

impl IndexOutcome {
    fn nothing(start_id: u64) -> Self {
        Self {
            written: 0,
            start_id,
            documents: Vec::new(),
        }
    }
}

/// Drives one index through rebuild / append / refine.
pub struct LifecycleManager<'a> {
    index: &'a dyn VectorIndex,
    embedder: &'a dyn Embedder,
    events: &'a dyn EventSink,
    options: LifecycleOptions,
}

impl<'a> LifecycleManager<'a> {
    pub fn new(
        index: &'a dyn VectorIndex,
        embedder: &'a dyn Embedder,
        events: &'a dyn EventSink,
        options: LifecycleOptions,
    ) -> Self {
        Self {
            index,
            embedder,
            events,
            options,
        }
    }

    /// Settings this manager enforces on the index.
    pub fn settings(&self) -> IndexSettings {
        IndexSettings {
            embedder: self.options.embedder_key.clone(),
            dimensions: self.embedder.dims(),
            searchable: vec!["name".to_string()],
            displayed: self.options.displayed.clone(),
        }
    }

    /// Index `records` under `mode`.
    ///
    /// Records are deduplicated by name first. `refine` takes its input from
    /// the index itself and rejects caller records.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] for zero batch sizes or records passed to refine,
    ///   before the index is touched.
    /// - Embedding and write failures propagate; batches already written
    ///   stay written.
    pub async fn index_records(
        &self,
        records: Vec<ItemRecord>,
        mode: IndexMode,
        batches: BatchSizes,
    ) -> Result<IndexOutcome> {
        if batches.embed == 0 || batches.write == 0 {
            return Err(Error::Config(
                "embedding and write batch sizes must be >= 1".to_string(),
            ));
        }
        if mode == IndexMode::Refine && !records.is_empty() {
            return Err(Error::Config(
                "refine mode rebuilds from the index's own names and takes no input records"
                    .to_string(),
            ));
        }

        let mut records = dedupe_by_name(records);
        let mut start_id = 1;

        match mode {
            IndexMode::Refine => {
                let names = self.all_names().await?;
                let names = dedupe_names(names);
                self.events.emit(Event::RefineFetched { names: names.len() });
                if names.is_empty() {
                    self.events.emit(Event::NothingToIndex { mode });
                    return Ok(IndexOutcome::nothing(start_id));
                }
                records = names.into_iter().map(ItemRecord::named).collect();
                self.events.emit(Event::ModeResolved {
                    mode,
                    records: records.len(),
                });
                self.reset().await?;
            }
            IndexMode::Rebuild => {
                if records.is_empty() {
                    self.events.emit(Event::NothingToIndex { mode });
                    return Ok(IndexOutcome::nothing(start_id));
                }
                self.events.emit(Event::ModeResolved {
                    mode,
                    records: records.len(),
                });
                self.reset().await?;
            }
            IndexMode::Append => {
                if records.is_empty() {
                    self.events.emit(Event::NothingToIndex { mode });
                    return Ok(IndexOutcome::nothing(start_id));
                }
                self.events.emit(Event::ModeResolved {
                    mode,
                    records: records.len(),
                });
                self.index.create_or_get().await?;
            }
        }

        self.apply_settings().await?;

        if mode == IndexMode::Append {
            let (existing, max_id) = self.existing_names_and_max_id().await?;
            start_id = max_id + 1;
            let before = records.len();
            records.retain(|r| !existing.contains(&r.name));
            self.events.emit(Event::AppendFiltered {
                skipped: before - records.len(),
                remaining: records.len(),
                start_id,
            });
            if records.is_empty() {
                self.events.emit(Event::NothingToIndex { mode });
                return Ok(IndexOutcome::nothing(start_id));
            }
        }

        let documents = self.embed_and_write(&records, start_id, batches).await?;
        Ok(IndexOutcome {
            written: documents.len(),
            start_id,
            documents,
        })
    }

    /// Delete the index (absence is fine) and create it again.
    async fn reset(&self) -> Result<()> {
        let uid = self.index.uid().to_string();
        match self.index.delete().await {
            Ok(()) => self.events.emit(Event::IndexDeleted { uid }),
            Err(e) if e.is_not_found() => self.events.emit(Event::IndexMissing { uid }),
            Err(e) => return Err(e),
        }
        self.index.create_or_get().await
    }

    async fn apply_settings(&self) -> Result<()> {
        let uid = self.index.uid().to_string();
        let event = match self.index.ensure_settings(&self.settings()).await? {
            SettingsOutcome::Unchanged => Event::SettingsUnchanged { uid },
            SettingsOutcome::Updated(fields) => Event::SettingsUpdated { uid, fields },
            SettingsOutcome::Unsupported(reason) => Event::SettingsUnsupported { uid, reason },
        };
        self.events.emit(event);
        Ok(())
    }

    /// Names already in the index and the largest stored id (0 when empty).
    pub async fn existing_names_and_max_id(&self) -> Result<(HashSet<String>, u64)> {
        let mut names = HashSet::new();
        let mut max_id = 0;
        let mut pages = DocumentPages::new(self.index, &["id", "name"], self.options.page_size);
        while let Some(page) = pages.next_page().await? {
            for doc in page {
                if let Some(name) = doc.name.filter(|n| !n.is_empty()) {
                    names.insert(name);
                }
                if let Some(id) = doc.id {
                    max_id = max_id.max(id);
                }
            }
        }
        Ok((names, max_id))
    }

    /// Every stored name in storage order, duplicates included. A missing
    /// index has no names.
    pub async fn all_names(&self) -> Result<Vec<String>> {
        let pages = DocumentPages::new(self.index, &["name"], self.options.page_size);
        let docs = match pages.collect_all().await {
            Ok(docs) => docs,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(docs
            .into_iter()
            .filter_map(|d| d.name.filter(|n| !n.is_empty()))
            .collect())
    }

    async fn embed_and_write(
        &self,
        records: &[ItemRecord],
        start_id: u64,
        batches: BatchSizes,
    ) -> Result<Vec<IndexedDocument>> {
        let opts = EncodeOptions {
            batch_size: batches.embed,
            max_length: self.options.max_length,
        };
        let dims = self.embedder.dims();

        let mut written = Vec::with_capacity(records.len());
        let mut pending: Vec<IndexedDocument> = Vec::with_capacity(batches.write);
        let mut next_id = start_id;

        for (n, chunk) in records.chunks(batches.embed).enumerate() {
            let texts: Vec<String> = chunk.iter().map(|r| r.name.clone()).collect();
            let vectors = self.embedder.encode(&texts, opts).await?;
            check_batch(texts.len(), &vectors, dims)?;
            self.events.emit(Event::BatchEncoded {
                offset: n * batches.embed,
                len: chunk.len(),
            });

            for (record, vector) in chunk.iter().zip(vectors) {
                pending.push(IndexedDocument {
                    id: next_id,
                    record: record.clone(),
                    vector,
                });
                next_id += 1;
                if pending.len() >= batches.write {
                    self.flush(&mut pending, &mut written).await?;
                }
            }
        }
        if !pending.is_empty() {
            self.flush(&mut pending, &mut written).await?;
        }

        Ok(written)
    }

    async fn flush(
        &self,
        pending: &mut Vec<IndexedDocument>,
        written: &mut Vec<IndexedDocument>,
    ) -> Result<()> {
        self.index
            .upsert_batch(pending, &self.options.embedder_key, self.options.wait)
            .await?;
        let last_id = pending.last().map(|d| d.id).unwrap_or_default();
        self.events.emit(Event::BatchWritten {
            count: pending.len(),
            last_id,
        });
        written.append(pending);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{NullSink, RecordingSink};
    use crate::index::memory::InMemoryIndex;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Deterministic 2-d embedder that records each call's batch size.
    struct CountingEmbedder {
        calls: Mutex<Vec<usize>>,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<usize> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn encode(&self, texts: &[String], _opts: EncodeOptions) -> Result<Vec<Vec<f32>>> {
            self.calls.lock().unwrap().push(texts.len());
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn model_name(&self) -> &str {
            "broken"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn encode(&self, texts: &[String], _opts: EncodeOptions) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
    }

    fn named(names: &[&str]) -> Vec<ItemRecord> {
        names.iter().map(|n| ItemRecord::named(*n)).collect()
    }

    fn existing(entries: &[(u64, &str)]) -> InMemoryIndex {
        InMemoryIndex::with_documents(
            "games",
            entries
                .iter()
                .map(|(id, name)| IndexedDocument {
                    id: *id,
                    record: ItemRecord::named(*name),
                    vector: vec![1.0, 1.0],
                })
                .collect(),
        )
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("Rebuild".parse::<IndexMode>().unwrap(), IndexMode::Rebuild);
        assert_eq!(" append ".parse::<IndexMode>().unwrap(), IndexMode::Append);
        assert_eq!("refine".parse::<IndexMode>().unwrap(), IndexMode::Refine);
        assert!(matches!(
            "merge".parse::<IndexMode>().unwrap_err(),
            Error::Config(_)
        ));
    }

    #[tokio::test]
    async fn rebuild_assigns_sequential_ids_from_one() {
        let index = existing(&[(7, "old")]);
        let embedder = CountingEmbedder::new();
        let manager =
            LifecycleManager::new(&index, &embedder, &NullSink, LifecycleOptions::default());

        let outcome = manager
            .index_records(named(&["a", "b", "a", "c"]), IndexMode::Rebuild, BatchSizes::default())
            .await
            .unwrap();

        assert_eq!(outcome.written, 3);
        assert_eq!(outcome.start_id, 1);
        assert_eq!(
            index.entries(),
            vec![(1, "a".into()), (2, "b".into()), (3, "c".into())]
        );
    }

    #[tokio::test]
    async fn batches_are_sized_independently() {
        let index = InMemoryIndex::new("games");
        let embedder = CountingEmbedder::new();
        let manager =
            LifecycleManager::new(&index, &embedder, &NullSink, LifecycleOptions::default());
        let names: Vec<String> = (0..7).map(|i| format!("item-{i}")).collect();
        let records = names.iter().map(ItemRecord::named).collect();

        manager
            .index_records(records, IndexMode::Rebuild, BatchSizes { embed: 3, write: 2 })
            .await
            .unwrap();

        assert_eq!(embedder.calls(), vec![3, 3, 1]);
        assert_eq!(index.written_batches(), vec![2, 2, 2, 1]);
        let ids: Vec<u64> = index.entries().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, (1..=7).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn append_skips_existing_and_continues_ids() {
        let index = existing(&[(1, "A"), (2, "B")]);
        let embedder = CountingEmbedder::new();
        let manager =
            LifecycleManager::new(&index, &embedder, &NullSink, LifecycleOptions::default());

        let outcome = manager
            .index_records(named(&["B", "C"]), IndexMode::Append, BatchSizes::default())
            .await
            .unwrap();

        assert_eq!(outcome.written, 1);
        assert_eq!(outcome.start_id, 3);
        assert_eq!(outcome.documents[0].record.name, "C");
        assert_eq!(
            index.entries(),
            vec![(1, "A".into()), (2, "B".into()), (3, "C".into())]
        );
    }

    #[tokio::test]
    async fn append_uses_max_id_not_count() {
        let index = existing(&[(3, "A"), (40, "B")]);
        let embedder = CountingEmbedder::new();
        let manager =
            LifecycleManager::new(&index, &embedder, &NullSink, LifecycleOptions::default());

        let outcome = manager
            .index_records(named(&["Z"]), IndexMode::Append, BatchSizes::default())
            .await
            .unwrap();
        assert_eq!(outcome.start_id, 41);
        assert_eq!(index.record(41).unwrap().name, "Z");
    }

    #[tokio::test]
    async fn append_with_nothing_new_writes_nothing() {
        let index = existing(&[(1, "A")]);
        let embedder = CountingEmbedder::new();
        let sink = RecordingSink::new();
        let manager = LifecycleManager::new(&index, &embedder, &sink, LifecycleOptions::default());

        let outcome = manager
            .index_records(named(&["A"]), IndexMode::Append, BatchSizes::default())
            .await
            .unwrap();

        assert_eq!(outcome.written, 0);
        assert_eq!(outcome.start_id, 2);
        assert!(embedder.calls().is_empty());
        assert!(sink
            .events()
            .contains(&Event::NothingToIndex { mode: IndexMode::Append }));
    }

    #[tokio::test]
    async fn rebuild_on_missing_index_succeeds() {
        let index = InMemoryIndex::new("fresh");
        let embedder = CountingEmbedder::new();
        let sink = RecordingSink::new();
        let manager = LifecycleManager::new(&index, &embedder, &sink, LifecycleOptions::default());

        let outcome = manager
            .index_records(named(&["x"]), IndexMode::Rebuild, BatchSizes::default())
            .await
            .unwrap();

        assert_eq!(outcome.written, 1);
        assert!(index.exists());
        assert!(sink.events().contains(&Event::IndexMissing {
            uid: "fresh".into()
        }));
    }

    #[tokio::test]
    async fn refine_dedupes_and_drops_metadata() {
        let mut with_size = ItemRecord::named("A");
        with_size.size = Some(10);
        let index = InMemoryIndex::with_documents(
            "games",
            vec![
                IndexedDocument {
                    id: 5,
                    record: with_size,
                    vector: vec![1.0, 1.0],
                },
                IndexedDocument {
                    id: 9,
                    record: ItemRecord::named("B"),
                    vector: vec![1.0, 1.0],
                },
                IndexedDocument {
                    id: 12,
                    record: ItemRecord::named("A"),
                    vector: vec![1.0, 1.0],
                },
            ],
        );
        let embedder = CountingEmbedder::new();
        let manager =
            LifecycleManager::new(&index, &embedder, &NullSink, LifecycleOptions::default());

        let outcome = manager
            .index_records(Vec::new(), IndexMode::Refine, BatchSizes::default())
            .await
            .unwrap();

        assert_eq!(outcome.written, 2);
        assert_eq!(index.entries(), vec![(1, "A".into()), (2, "B".into())]);
        assert_eq!(index.record(1).unwrap().size, None);
    }

    #[tokio::test]
    async fn refine_rejects_input_records() {
        let index = InMemoryIndex::new("games");
        let embedder = CountingEmbedder::new();
        let manager =
            LifecycleManager::new(&index, &embedder, &NullSink, LifecycleOptions::default());
        let err = manager
            .index_records(named(&["a"]), IndexMode::Refine, BatchSizes::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!index.exists());
    }

    #[tokio::test]
    async fn refine_on_empty_index_is_noop() {
        let index = InMemoryIndex::new("games");
        let embedder = CountingEmbedder::new();
        let manager =
            LifecycleManager::new(&index, &embedder, &NullSink, LifecycleOptions::default());
        let outcome = manager
            .index_records(Vec::new(), IndexMode::Refine, BatchSizes::default())
            .await
            .unwrap();
        assert_eq!(outcome.written, 0);
        assert!(!index.exists());
    }

    #[tokio::test]
    async fn zero_batch_size_is_config_error() {
        let index = InMemoryIndex::new("games");
        let embedder = CountingEmbedder::new();
        let manager =
            LifecycleManager::new(&index, &embedder, &NullSink, LifecycleOptions::default());
        let err = manager
            .index_records(named(&["a"]), IndexMode::Rebuild, BatchSizes { embed: 0, write: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!index.exists());
    }

    #[tokio::test]
    async fn wrong_vector_width_aborts_before_write() {
        let index = InMemoryIndex::new("games");
        let manager =
            LifecycleManager::new(&index, &BrokenEmbedder, &NullSink, LifecycleOptions::default());
        let err = manager
            .index_records(named(&["a"]), IndexMode::Rebuild, BatchSizes::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 1 }));
        assert!(index.written_batches().is_empty());
    }

    #[tokio::test]
    async fn unsupported_settings_only_warn() {
        let index = InMemoryIndex::new("games").without_settings_support();
        let embedder = CountingEmbedder::new();
        let sink = RecordingSink::new();
        let manager = LifecycleManager::new(&index, &embedder, &sink, LifecycleOptions::default());
        let outcome = manager
            .index_records(named(&["a"]), IndexMode::Rebuild, BatchSizes::default())
            .await
            .unwrap();
        assert_eq!(outcome.written, 1);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, Event::SettingsUnsupported { .. })));
    }

    #[tokio::test]
    async fn settings_follow_embedder_and_apply_once() {
        let index = InMemoryIndex::new("games");
        let embedder = CountingEmbedder::new();
        let sink = RecordingSink::new();
        let manager = LifecycleManager::new(&index, &embedder, &sink, LifecycleOptions::default());

        manager
            .index_records(named(&["a"]), IndexMode::Append, BatchSizes::default())
            .await
            .unwrap();
        let applied = index.settings().unwrap();
        assert_eq!(applied.embedder, "default");
        assert_eq!(applied.dimensions, 2);
        assert_eq!(applied.searchable, vec!["name"]);
        assert_eq!(applied.displayed.len(), DISPLAYED_FIELDS.len());

        manager
            .index_records(named(&["b"]), IndexMode::Append, BatchSizes::default())
            .await
            .unwrap();
        let events = sink.events();
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::SettingsUpdated { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::SettingsUnchanged { .. })));
    }
}
