//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the only view the engine has of the
//! vector-search backend: index lifecycle, settings, batched writes,
//! paginated reads, and nearest-neighbor search. Adapters translate their
//! backend's wire format into [`DocumentPayload`] and the typed errors in
//! [`crate::Error`].
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{DocumentPayload, IndexedDocument};

/// Settings the engine expects on the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSettings {
    /// Name of the user-provided embedder / vector field.
    pub embedder: String,
    /// Vector dimension registered for that embedder.
    pub dimensions: usize,
    pub searchable: Vec<String>,
    pub displayed: Vec<String>,
}

impl IndexSettings {
    /// Settings for a name index with the given displayed fields.
    pub fn new(embedder: impl Into<String>, dimensions: usize, displayed: &[&str]) -> Self {
        Self {
            embedder: embedder.into(),
            dimensions,
            searchable: vec!["name".to_string()],
            displayed: displayed.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Result of [`VectorIndex::ensure_settings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsOutcome {
    /// Already matched; nothing sent.
    Unchanged,
    /// Only these top-level settings were changed.
    Updated(Vec<String>),
    /// The backend could not read or apply the settings.
    Unsupported(String),
}

/// Abstract vector-search backend bound to one index.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_or_get`](VectorIndex::create_or_get) | Create the index if absent |
/// | [`delete`](VectorIndex::delete) | Delete the index |
/// | [`ensure_settings`](VectorIndex::ensure_settings) | Apply the settings delta |
/// | [`upsert_batch`](VectorIndex::upsert_batch) | Insert or replace documents |
/// | [`fetch_page`](VectorIndex::fetch_page) | Read stored documents by offset |
/// | [`search_by_vector`](VectorIndex::search_by_vector) | Nearest-neighbor search |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Identifier of the index this client is bound to.
    fn uid(&self) -> &str;

    /// Create the index if it does not exist. Idempotent.
    async fn create_or_get(&self) -> Result<()>;

    /// Delete the index. Returns [`Error::IndexNotFound`](crate::Error::IndexNotFound)
    /// when it does not exist; callers decide whether that matters.
    async fn delete(&self) -> Result<()>;

    /// Make the index settings match `desired`, sending only what differs.
    ///
    /// Unsupported-feature failures are reported as
    /// [`SettingsOutcome::Unsupported`], not as errors.
    async fn ensure_settings(&self, desired: &IndexSettings) -> Result<SettingsOutcome>;

    /// Insert or replace documents. With `wait`, returns only after the
    /// backend confirms persistence.
    async fn upsert_batch(
        &self,
        docs: &[IndexedDocument],
        embedder: &str,
        wait: bool,
    ) -> Result<()>;

    /// Read one page of stored documents restricted to `fields`.
    async fn fetch_page(
        &self,
        fields: &[&str],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<DocumentPayload>>;

    /// Return up to `limit` stored documents closest to `vector`, best first.
    async fn search_by_vector(
        &self,
        vector: &[f32],
        limit: usize,
        embedder: &str,
    ) -> Result<Vec<DocumentPayload>>;
}

/// Cursor over all stored documents, one page per call.
///
/// Iteration ends after the first page shorter than `page_size`.
pub struct DocumentPages<'a, I: VectorIndex + ?Sized> {
    index: &'a I,
    fields: Vec<&'a str>,
    page_size: usize,
    offset: usize,
    done: bool,
}

impl<'a, I: VectorIndex + ?Sized> DocumentPages<'a, I> {
    pub fn new(index: &'a I, fields: &[&'a str], page_size: usize) -> Self {
        Self {
            index,
            fields: fields.to_vec(),
            page_size: page_size.max(1),
            offset: 0,
            done: false,
        }
    }

    /// Fetch the next page, or `None` once the documents are exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<DocumentPayload>>> {
        if self.done {
            return Ok(None);
        }
        let page = self
            .index
            .fetch_page(&self.fields, self.offset, self.page_size)
            .await?;
        self.offset += page.len();
        if page.len() < self.page_size {
            self.done = true;
        }
        if page.is_empty() {
            return Ok(None);
        }
        Ok(Some(page))
    }

    /// Drain every remaining page into one vector.
    pub async fn collect_all(mut self) -> Result<Vec<DocumentPayload>> {
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await? {
            all.extend(page);
        }
        Ok(all)
    }
}
