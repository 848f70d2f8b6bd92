//! # semdedup core
//!
//! The similarity-indexing and deduplication engine behind `semdedup`:
//! record model and normalization, the index lifecycle (rebuild / append /
//! refine), composite similarity scoring, and union-find clustering.
//!
//! This crate does no filesystem, HTTP, or runtime work. Embedding models
//! and vector-search backends come in through the [`embedding::Embedder`]
//! and [`index::VectorIndex`] traits; progress goes out through an
//! [`events::EventSink`].
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`models`] | Records, indexed documents, edges, groups |
//! | [`records`] | Name-list / JSON parsing and name deduplication |
//! | [`embedding`] | `Embedder` trait, batch checks, cosine |
//! | [`index`] | `VectorIndex` trait, pagination, in-memory index |
//! | [`lifecycle`] | `LifecycleManager` and index modes |
//! | [`similarity`] | Semantic, time, size, and composite scores |
//! | [`cluster`] | Union-find and grouping |
//! | [`dedupe`] | `DuplicateFinder` |
//! | [`events`] | Structured events and sinks |

pub mod cluster;
pub mod dedupe;
pub mod embedding;
pub mod error;
pub mod events;
pub mod index;
pub mod lifecycle;
pub mod models;
pub mod records;
pub mod similarity;

pub use error::{Error, Result};
