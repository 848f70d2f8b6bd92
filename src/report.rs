//! Duplicate report rendering (text or JSON) for `semdedup dedupe`.

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use std::io::Write;

use semdedup_core::dedupe::DedupeReport;
use semdedup_core::models::{GroupMember, SimilarityEdge};

/// Write the human-readable group listing.
///
/// ```text
/// [group 1] 2 items
///   - id=1 [new] Halo 3 (size=100; mtime=2023-11-14T22:13:20Z)
///   - id=2 [existing] Halo3 ()
///     * pair id 1 <-> 2: composite=0.950, semantic=0.950
/// ```
pub fn render_text(report: &DedupeReport, out: &mut dyn Write) -> Result<()> {
    if report.groups.is_empty() {
        writeln!(out, "No duplicate groups found.")?;
        return Ok(());
    }
    for (n, group) in report.groups.iter().enumerate() {
        if n > 0 {
            writeln!(out)?;
        }
        writeln!(out, "[group {}] {} items", n + 1, group.len())?;
        for member in &group.members {
            writeln!(out, "  - {}", member_line(member))?;
        }
        for edge in &group.edges {
            writeln!(out, "    * {}", edge_line(edge))?;
        }
    }
    Ok(())
}

/// Write the report as pretty JSON.
pub fn render_json(report: &DedupeReport, out: &mut dyn Write) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, report)?;
    writeln!(out)?;
    Ok(())
}

fn member_line(member: &GroupMember) -> String {
    let record = &member.record;
    let mut meta = Vec::new();
    if let Some(size) = record.size {
        meta.push(format!("size={}", size));
    }
    if let Some(ctime) = record.ctime {
        meta.push(format!("ctime={}", format_timestamp(ctime)));
    }
    if let Some(mtime) = record.mtime {
        meta.push(format!("mtime={}", format_timestamp(mtime)));
    }
    format!(
        "id={} [{}] {} ({})",
        member.id,
        record.source,
        record.name,
        meta.join("; ")
    )
}

fn edge_line(edge: &SimilarityEdge) -> String {
    let mut line = format!(
        "pair id {} <-> {}: composite={:.3}, semantic={:.3}",
        edge.a, edge.b, edge.composite, edge.semantic
    );
    for (signal, score) in &edge.meta_scores {
        line.push_str(&format!(", {}={:.3}", signal, score));
    }
    line
}

/// Epoch seconds as UTC RFC 3339; raw seconds when out of range.
fn format_timestamp(secs: f64) -> String {
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9) as u32;
    match DateTime::<Utc>::from_timestamp(whole as i64, nanos) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => format!("{:.0}", secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semdedup_core::models::{DuplicateGroup, ItemRecord, Provenance, Signal};
    use std::collections::BTreeMap;

    fn sample() -> DedupeReport {
        let mut first = ItemRecord::named("Halo 3");
        first.size = Some(100);
        first.mtime = Some(1_700_000_000.0);
        let mut second = ItemRecord::named("Halo3");
        second.source = Provenance::Existing;

        DedupeReport {
            groups: vec![DuplicateGroup {
                root: 1,
                members: vec![
                    GroupMember {
                        id: 1,
                        record: first,
                    },
                    GroupMember {
                        id: 2,
                        record: second,
                    },
                ],
                edges: vec![SimilarityEdge {
                    a: 1,
                    b: 2,
                    composite: 0.9,
                    semantic: 0.95,
                    meta_scores: BTreeMap::from([(Signal::Size, 0.85)]),
                }],
            }],
            items: 2,
            edges: 1,
            failed_searches: 0,
        }
    }

    #[test]
    fn text_lists_members_and_pairs() {
        let mut buf = Vec::new();
        render_text(&sample(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("[group 1] 2 items"));
        assert!(text.contains("id=1 [new] Halo 3 (size=100; mtime=2023-11-14T22:13:20Z)"));
        assert!(text.contains("id=2 [existing] Halo3 ()"));
        assert!(text.contains("pair id 1 <-> 2: composite=0.900, semantic=0.950, size=0.850"));
    }

    #[test]
    fn empty_report_says_so() {
        let mut buf = Vec::new();
        render_text(&DedupeReport::default(), &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "No duplicate groups found.\n");
    }

    #[test]
    fn json_has_flattened_members() {
        let mut buf = Vec::new();
        render_json(&sample(), &mut buf).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        let member = &value["groups"][0]["members"][1];
        assert_eq!(member["name"], "Halo3");
        assert_eq!(member["source"], "existing");
        assert_eq!(value["groups"][0]["edges"][0]["meta_scores"]["size"], 0.85);
    }
}
