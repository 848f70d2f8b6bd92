//! # semdedup
//!
//! Near-duplicate grouping for short text records (game titles, file
//! names) over a Meilisearch vector index.
//!
//! Records come from a name list, a JSON record file, or a filesystem
//! scan. Each name is embedded, stored with its metadata, and then
//! searched for its nearest neighbors; pairs whose composite score clears
//! the threshold are merged into duplicate groups.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Inputs    │──▶│  Lifecycle   │──▶│ Meilisearch  │
//! │ txt/json/fs │   │ embed+write  │   │ user vectors │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                             │ neighbors
//!                                      ┌──────▼───────┐
//!                                      │ score+cluster│──▶ report
//!                                      └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! semdedup build --input games.txt --mode rebuild
//! semdedup build --mode append --input more_games.txt
//! semdedup dedupe --fs ~/Downloads --check-size --check-mtime
//! semdedup search "halo 3"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`connector_fs`] | Filesystem scan into records |
//! | [`ingest`] | Input loading and scan dumps |
//! | [`embedding`] | Embedding providers behind the core `Embedder` trait |
//! | [`meili`] | Meilisearch `VectorIndex` adapter |
//! | [`progress`] | Event sinks (tracing or JSON lines) |
//! | [`report`] | Duplicate report rendering |
//! | [`build_cmd`] | `semdedup build` |
//! | [`dedupe_cmd`] | `semdedup dedupe` |
//! | [`search`] | `semdedup search` |

pub mod build_cmd;
pub mod config;
pub mod connector_fs;
pub mod dedupe_cmd;
pub mod embedding;
pub mod ingest;
pub mod meili;
pub mod progress;
pub mod report;
pub mod search;
