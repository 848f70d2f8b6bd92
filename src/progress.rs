//! Event reporting for `build` and `dedupe`.
//!
//! The engine emits typed [`Event`]s through an [`EventSink`]; this module
//! decides where they go. Everything is written to **stderr** so stdout
//! remains parseable for scripts.

use std::io::Write;

use semdedup_core::events::{Event, EventSink, Level};

/// Forwards events to `tracing` at the event's level.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: Event) {
        let kind = event.kind();
        match event.level() {
            Level::Debug => tracing::debug!(event = kind, "{}", event),
            Level::Info => tracing::info!(event = kind, "{}", event),
            Level::Warn => tracing::warn!(event = kind, "{}", event),
        }
    }
}

/// Machine-readable events: one JSON object per line on stderr.
pub struct JsonSink {
    /// Drop `debug` events unless set.
    pub verbose: bool,
}

impl JsonSink {
    fn line(event: &Event) -> Option<String> {
        let mut obj = serde_json::to_value(event).ok()?;
        if let Some(map) = obj.as_object_mut() {
            map.insert("level".to_string(), serde_json::to_value(event.level()).ok()?);
        }
        serde_json::to_string(&obj).ok()
    }
}

impl EventSink for JsonSink {
    fn emit(&self, event: Event) {
        if event.level() == Level::Debug && !self.verbose {
            return;
        }
        if let Some(line) = Self::line(&event) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// How the CLI reports engine events.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum EventMode {
    /// Log lines through `tracing`.
    Human,
    /// One JSON object per line.
    Json,
}

impl EventMode {
    pub fn sink(&self, verbose: bool) -> Box<dyn EventSink> {
        match self {
            EventMode::Human => Box::new(TracingSink),
            EventMode::Json => Box::new(JsonSink { verbose }),
        }
    }
}

/// `1234567` → `"1,234,567"`.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}
