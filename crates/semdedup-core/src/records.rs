//! Record normalization.
//!
//! Turns raw input (newline name lists, JSON record arrays) into
//! [`ItemRecord`]s and removes repeated names. File access lives in the
//! application crate; everything here works on in-memory text.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::ItemRecord;

/// Drop records with empty or already-seen names, keeping the first
/// occurrence and the original order.
pub fn dedupe_by_name(records: Vec<ItemRecord>) -> Vec<ItemRecord> {
    let mut seen: HashSet<String> = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|r| !r.name.is_empty() && seen.insert(r.name.clone()))
        .collect()
}

/// Same as [`dedupe_by_name`] for bare names.
pub fn dedupe_names(names: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(names.len());
    names
        .into_iter()
        .filter(|n| !n.is_empty() && seen.insert(n.clone()))
        .collect()
}

/// Parse a newline-delimited name list. Lines are trimmed; blank lines are
/// ignored.
pub fn parse_name_list(text: &str) -> Vec<ItemRecord> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ItemRecord::named)
        .collect()
}

/// Parse a JSON array of `{name, path?, ctime?, mtime?, size?}` objects.
///
/// `filename` is accepted when `name` is absent. Non-object entries and
/// entries without a name are skipped; a value that is not an array yields
/// no records. Metadata fields with the wrong type are treated as absent.
pub fn parse_json_records(text: &str) -> Result<Vec<ItemRecord>> {
    let data: Value = serde_json::from_str(text)
        .map_err(|e| Error::Config(format!("invalid JSON record list: {e}")))?;
    Ok(records_from_value(&data))
}

/// Convert an already-parsed JSON value into records. See
/// [`parse_json_records`].
pub fn records_from_value(data: &Value) -> Vec<ItemRecord> {
    let Some(entries) = data.as_array() else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let obj = entry.as_object()?;
            let name = obj
                .get("name")
                .filter(|v| is_present(v))
                .or_else(|| obj.get("filename").filter(|v| is_present(v)))
                .map(value_to_name)?;
            if name.is_empty() {
                return None;
            }
            Some(ItemRecord {
                name,
                path: obj.get("path").and_then(Value::as_str).map(str::to_string),
                ctime: obj.get("ctime").and_then(Value::as_f64),
                mtime: obj.get("mtime").and_then(Value::as_f64),
                size: obj.get("size").and_then(Value::as_u64),
                ..ItemRecord::named(String::new())
            })
        })
        .collect()
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Bool(b) => *b,
        _ => true,
    }
}

fn value_to_name(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(records: &[ItemRecord]) -> Vec<&str> {
        records.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn dedupe_keeps_first_occurrence_order() {
        let input = vec![
            ItemRecord::named("b"),
            ItemRecord::named("a"),
            ItemRecord::named("b"),
            ItemRecord::named("c"),
            ItemRecord::named("a"),
        ];
        let out = dedupe_by_name(input);
        assert_eq!(names(&out), vec!["b", "a", "c"]);
    }

    #[test]
    fn dedupe_is_idempotent() {
        let input = parse_name_list("x\ny\nx\nz\ny\n");
        let once = dedupe_by_name(input);
        let twice = dedupe_by_name(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn dedupe_first_record_wins_metadata() {
        let mut first = ItemRecord::named("dup");
        first.size = Some(1);
        let mut second = ItemRecord::named("dup");
        second.size = Some(2);
        let out = dedupe_by_name(vec![first, second]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].size, Some(1));
    }

    #[test]
    fn dedupe_drops_empty_names() {
        let out = dedupe_by_name(vec![ItemRecord::named(""), ItemRecord::named("a")]);
        assert_eq!(names(&out), vec!["a"]);
    }

    #[test]
    fn name_list_trims_and_skips_blank_lines() {
        let out = parse_name_list("  Halo 3  \n\n\t\nMario\r\n");
        assert_eq!(names(&out), vec!["Halo 3", "Mario"]);
    }

    #[test]
    fn json_records_with_metadata() {
        let text = r#"[
            {"name": "a.iso", "path": "/x/a.iso", "ctime": 10.5, "mtime": 11, "size": 100},
            {"filename": "b.iso"},
            {"path": "/no/name"},
            "not an object",
            {"name": "", "filename": "c.iso", "size": -4}
        ]"#;
        let out = parse_json_records(text).unwrap();
        assert_eq!(names(&out), vec!["a.iso", "b.iso", "c.iso"]);
        assert_eq!(out[0].ctime, Some(10.5));
        assert_eq!(out[0].mtime, Some(11.0));
        assert_eq!(out[0].size, Some(100));
        assert_eq!(out[0].path.as_deref(), Some("/x/a.iso"));
        assert_eq!(out[2].size, None);
    }

    #[test]
    fn json_non_array_yields_nothing() {
        let out = parse_json_records(r#"{"name": "a"}"#).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn json_syntax_error_is_config_error() {
        let err = parse_json_records("[{").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
