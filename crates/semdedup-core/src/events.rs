//! Structured events emitted by the engine.
//!
//! The lifecycle manager and the duplicate finder report what they do
//! through an [`EventSink`] handed to them at construction. The application
//! decides where events go (tracing, JSON lines, nowhere).

use std::fmt;

use serde::Serialize;

use crate::lifecycle::IndexMode;

/// Severity attached to each event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
}

/// Something the engine did or ran into.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    ModeResolved {
        mode: IndexMode,
        records: usize,
    },
    IndexDeleted {
        uid: String,
    },
    IndexMissing {
        uid: String,
    },
    SettingsUnchanged {
        uid: String,
    },
    SettingsUpdated {
        uid: String,
        fields: Vec<String>,
    },
    SettingsUnsupported {
        uid: String,
        reason: String,
    },
    AppendFiltered {
        skipped: usize,
        remaining: usize,
        start_id: u64,
    },
    RefineFetched {
        names: usize,
    },
    NothingToIndex {
        mode: IndexMode,
    },
    BatchEncoded {
        offset: usize,
        len: usize,
    },
    BatchWritten {
        count: usize,
        last_id: u64,
    },
    SearchStarted {
        items: usize,
        threshold: f64,
        top_k: usize,
    },
    NeighborSearchFailed {
        id: u64,
        error: String,
    },
    GroupsFound {
        groups: usize,
        edges: usize,
    },
}

impl Event {
    pub fn level(&self) -> Level {
        match self {
            Event::SettingsUnsupported { .. } | Event::NeighborSearchFailed { .. } => Level::Warn,
            Event::SettingsUnchanged { .. } | Event::BatchEncoded { .. } => Level::Debug,
            _ => Level::Info,
        }
    }

    /// Short machine name, identical to the serialized `event` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ModeResolved { .. } => "mode_resolved",
            Event::IndexDeleted { .. } => "index_deleted",
            Event::IndexMissing { .. } => "index_missing",
            Event::SettingsUnchanged { .. } => "settings_unchanged",
            Event::SettingsUpdated { .. } => "settings_updated",
            Event::SettingsUnsupported { .. } => "settings_unsupported",
            Event::AppendFiltered { .. } => "append_filtered",
            Event::RefineFetched { .. } => "refine_fetched",
            Event::NothingToIndex { .. } => "nothing_to_index",
            Event::BatchEncoded { .. } => "batch_encoded",
            Event::BatchWritten { .. } => "batch_written",
            Event::SearchStarted { .. } => "search_started",
            Event::NeighborSearchFailed { .. } => "neighbor_search_failed",
            Event::GroupsFound { .. } => "groups_found",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::ModeResolved { mode, records } => {
                write!(f, "mode={mode}: {records} input records")
            }
            Event::IndexDeleted { uid } => write!(f, "deleted index {uid}"),
            Event::IndexMissing { uid } => write!(f, "index {uid} not found; nothing to delete"),
            Event::SettingsUnchanged { uid } => write!(f, "index {uid} settings already current"),
            Event::SettingsUpdated { uid, fields } => {
                write!(f, "index {uid} settings updated: {}", fields.join(", "))
            }
            Event::SettingsUnsupported { uid, reason } => {
                write!(f, "index {uid} settings not applied (likely unsupported): {reason}")
            }
            Event::AppendFiltered {
                skipped,
                remaining,
                start_id,
            } => write!(
                f,
                "append: skipped {skipped} existing names, {remaining} new; start id={start_id}"
            ),
            Event::RefineFetched { names } => write!(f, "refine: {names} names after dedup"),
            Event::NothingToIndex { mode } => write!(f, "mode={mode}: nothing to index"),
            Event::BatchEncoded { offset, len } => {
                write!(f, "encoded batch [{offset}:{})", offset + len)
            }
            Event::BatchWritten { count, last_id } => {
                write!(f, "wrote {count} documents (up to id={last_id})")
            }
            Event::SearchStarted {
                items,
                threshold,
                top_k,
            } => write!(
                f,
                "neighbor search over {items} items, threshold={threshold:.3}, top_k={top_k}"
            ),
            Event::NeighborSearchFailed { id, error } => {
                write!(f, "neighbor search for id {id} failed; skipping: {error}")
            }
            Event::GroupsFound { groups, edges } => {
                write!(f, "found {groups} groups from {edges} accepted pairs")
            }
        }
    }
}

/// Receives engine events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Drops every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

/// Keeps every event in memory, in order. Useful for assertions.
#[derive(Default)]
pub struct RecordingSink {
    events: std::sync::Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: Event) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}
