//! Similarity signals and their fusion into one composite score.
//!
//! Every function here is pure. Scores are `f64` in `[0, 1]`.
//!
//! | Signal | Formula | Missing when |
//! |--------|---------|--------------|
//! | semantic | `cosine(a, b)` clamped to `[0, 1]` | never (zero vectors score 0) |
//! | ctime / mtime | `max(0, 1 - |Δt| / max(window, 1))` | either side lacks the timestamp |
//! | size | `max(0, 1 - min(|Δs| / max(a, b, 1), 1))` | either side lacks a size |
//!
//! The composite is the unweighted mean of semantic and every enabled
//! signal that produced a value, and exactly the semantic score when none
//! did.

use std::collections::BTreeMap;

use crate::embedding::cosine_similarity;
use crate::models::{ItemRecord, Signal};

/// Which metadata signals take part in the composite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetaSignals {
    pub ctime: bool,
    pub mtime: bool,
    pub size: bool,
}

impl MetaSignals {
    /// Only the semantic score.
    pub fn none() -> Self {
        Self::default()
    }

    /// Both timestamps.
    pub fn time() -> Self {
        Self {
            ctime: true,
            mtime: true,
            size: false,
        }
    }

    /// True when at least one metadata signal is enabled.
    pub fn any(&self) -> bool {
        self.ctime || self.mtime || self.size
    }
}

/// Cosine similarity mapped into `[0, 1]`.
///
/// Negative cosines score 0, as do zero-norm vectors and non-finite
/// results.
pub fn semantic_similarity(a: &[f32], b: &[f32]) -> f64 {
    let sim = cosine_similarity(a, b) as f64;
    if sim.is_finite() {
        sim.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Linear decay from 1 at equal timestamps to 0 at `window` seconds apart.
///
/// Windows below one second are treated as one second.
pub fn time_similarity(a: Option<f64>, b: Option<f64>, window: f64) -> Option<f64> {
    let (a, b) = (a?, b?);
    let window = if window.is_finite() { window.max(1.0) } else { 1.0 };
    let score = 1.0 - (a - b).abs() / window;
    Some(if score.is_finite() { score.max(0.0) } else { 0.0 })
}

/// Relative size similarity: 1 for equal sizes, 0 once the difference
/// reaches the larger size.
pub fn size_similarity(a: Option<u64>, b: Option<u64>) -> Option<f64> {
    let (a, b) = (a?, b?);
    let diff = a.abs_diff(b) as f64;
    let base = a.max(b).max(1) as f64;
    Some((1.0 - (diff / base).min(1.0)).max(0.0))
}

/// Values of the enabled signals for one pair, keyed by signal. Signals
/// whose inputs are missing are left out.
pub fn meta_scores(
    a: &ItemRecord,
    b: &ItemRecord,
    signals: MetaSignals,
    time_window: f64,
) -> BTreeMap<Signal, f64> {
    let mut scores = BTreeMap::new();
    if !signals.any() {
        return scores;
    }
    if signals.ctime {
        if let Some(s) = time_similarity(a.ctime, b.ctime, time_window) {
            scores.insert(Signal::Ctime, s);
        }
    }
    if signals.mtime {
        if let Some(s) = time_similarity(a.mtime, b.mtime, time_window) {
            scores.insert(Signal::Mtime, s);
        }
    }
    if signals.size {
        if let Some(s) = size_similarity(a.size, b.size) {
            scores.insert(Signal::Size, s);
        }
    }
    scores
}

/// Mean of `semantic` and every metadata score.
pub fn composite(semantic: f64, meta: &BTreeMap<Signal, f64>) -> f64 {
    if meta.is_empty() {
        return semantic;
    }
    let sum: f64 = semantic + meta.values().sum::<f64>();
    sum / (1 + meta.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sized(size: u64) -> ItemRecord {
        let mut r = ItemRecord::named("x");
        r.size = Some(size);
        r
    }

    #[test]
    fn semantic_is_clamped() {
        assert_eq!(semantic_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        assert_eq!(semantic_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((semantic_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn time_decays_linearly() {
        assert_eq!(time_similarity(Some(100.0), Some(100.0), 900.0), Some(1.0));
        let half = time_similarity(Some(0.0), Some(450.0), 900.0).unwrap();
        assert!((half - 0.5).abs() < 1e-9);
        assert_eq!(time_similarity(Some(0.0), Some(5000.0), 900.0), Some(0.0));
        assert_eq!(time_similarity(None, Some(1.0), 900.0), None);
    }

    #[test]
    fn tiny_window_floors_at_one_second() {
        assert_eq!(time_similarity(Some(0.0), Some(0.5), 0.0), Some(0.5));
    }

    #[test]
    fn size_relative_to_larger() {
        let s = size_similarity(Some(100), Some(150)).unwrap();
        assert!((s - (1.0 - 50.0 / 150.0)).abs() < 1e-9);
        assert_eq!(size_similarity(Some(0), Some(0)), Some(1.0));
        assert_eq!(size_similarity(Some(0), Some(10)), Some(0.0));
        assert_eq!(size_similarity(Some(3), None), None);
    }

    #[test]
    fn composite_without_signals_is_semantic() {
        assert_eq!(composite(0.42, &BTreeMap::new()), 0.42);
    }

    #[test]
    fn composite_with_size() {
        let meta = meta_scores(
            &sized(100),
            &sized(150),
            MetaSignals {
                size: true,
                ..MetaSignals::none()
            },
            900.0,
        );
        let score = composite(1.0, &meta);
        assert!((score - 0.8333).abs() < 1e-3);
    }

    #[test]
    fn disabled_and_missing_signals_are_skipped() {
        let a = sized(10);
        let b = ItemRecord::named("y");
        let all = MetaSignals {
            ctime: true,
            mtime: true,
            size: true,
        };
        assert!(meta_scores(&a, &b, all, 900.0).is_empty());
        assert!(meta_scores(&a, &a, MetaSignals::none(), 900.0).is_empty());
    }

    #[test]
    fn composite_stays_in_unit_range() {
        for semantic in [0.0, 0.3, 1.0] {
            for extra in [0.0, 0.5, 1.0] {
                let meta = BTreeMap::from([(Signal::Ctime, extra), (Signal::Size, extra)]);
                let c = composite(semantic, &meta);
                assert!((0.0..=1.0).contains(&c));
            }
        }
    }

    #[test]
    fn time_preset_scores_both_timestamps() {
        let mut a = ItemRecord::named("x");
        a.ctime = Some(0.0);
        a.mtime = Some(0.0);
        let mut b = ItemRecord::named("y");
        b.ctime = Some(450.0);
        b.mtime = Some(900.0);

        assert!(MetaSignals::time().any());
        assert!(!MetaSignals::none().any());
        let meta = meta_scores(&a, &b, MetaSignals::time(), 900.0);
        assert_eq!(meta.get(&Signal::Ctime), Some(&0.5));
        assert_eq!(meta.get(&Signal::Mtime), Some(&0.0));
        assert!(!meta.contains_key(&Signal::Size));
    }
}
