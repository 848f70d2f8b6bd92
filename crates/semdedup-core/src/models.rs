//! Core data types that flow through ingestion, indexing, and clustering.
//!
//! - [`ItemRecord`]: a candidate record as loaded from an input source.
//! - [`IndexedDocument`]: a record that has been assigned an id and a vector.
//! - [`DocumentPayload`]: the fixed shape the index returns for stored
//!   documents and neighbor hits.
//! - [`SimilarityEdge`] / [`DuplicateGroup`]: per-run clustering output.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Ingested in the current run.
    #[default]
    New,
    /// Discovered through a neighbor search; already present in the index.
    Existing,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::New => f.write_str("new"),
            Provenance::Existing => f.write_str("existing"),
        }
    }
}

/// A name plus optional filesystem metadata.
///
/// Timestamps are seconds since the Unix epoch (fractional allowed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctime: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default)]
    pub source: Provenance,
}

impl ItemRecord {
    /// A bare name with no metadata.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            ctime: None,
            mtime: None,
            size: None,
            source: Provenance::New,
        }
    }

    /// Rebuild a record from an index payload, tagged as pre-existing.
    ///
    /// Returns `None` when the payload carries no usable name.
    pub fn from_payload(payload: &DocumentPayload) -> Option<Self> {
        let name = payload.name.as_deref().filter(|n| !n.is_empty())?;
        Some(Self {
            name: name.to_string(),
            path: payload.path.clone(),
            ctime: payload.ctime,
            mtime: payload.mtime,
            size: payload.size,
            source: Provenance::Existing,
        })
    }
}

/// A record that has been assigned an id and an embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub id: u64,
    pub record: ItemRecord,
    pub vector: Vec<f32>,
}

/// Document fields as returned by the index for fetches and neighbor hits.
///
/// `id` is `None` when the backend returned a missing or non-integer id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentPayload {
    pub id: Option<u64>,
    pub name: Option<String>,
    pub path: Option<String>,
    pub ctime: Option<f64>,
    pub mtime: Option<f64>,
    pub size: Option<u64>,
}

/// Names of the optional metadata signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Ctime,
    Mtime,
    Size,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Ctime => f.write_str("ctime"),
            Signal::Mtime => f.write_str("mtime"),
            Signal::Size => f.write_str("size"),
        }
    }
}

/// An accepted pair whose composite score reached the threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityEdge {
    pub a: u64,
    pub b: u64,
    pub composite: f64,
    pub semantic: f64,
    pub meta_scores: BTreeMap<Signal, f64>,
}

/// One member of a duplicate group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMember {
    pub id: u64,
    #[serde(flatten)]
    pub record: ItemRecord,
}

/// A connected component of accepted edges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    pub root: u64,
    /// Members ordered by id.
    pub members: Vec<GroupMember>,
    /// Edges ordered by descending composite score.
    pub edges: Vec<SimilarityEdge>,
}

impl DuplicateGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member_ids(&self) -> Vec<u64> {
        self.members.iter().map(|m| m.id).collect()
    }
}
