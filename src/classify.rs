// classify.rs — Statistics → bounded motion result.
//
// A pure function of the statistics record, the number of pixels at
// analysis resolution and the classifier thresholds. It never touches the
// device, so thresholds can be exercised on synthetic records.
//
//   mean      = Σ|v| / n
//   variance  = Σ|v|² / n - mean²              (floored at 0)
//   coherence = |Σv / n| / mean                (0 when mean <= ε)
//   coverage  = significant / total_pixels
//   total     = clamp01(mean / reference)
//
// A scene cut (large mean AND large coverage) is all global. Otherwise the
// total is split by coherence; when coherence is low the local part is at
// least the spread of magnitudes, so divergent motion that cancels in the
// mean vector still registers as local.

use serde::{Deserialize, Serialize};

use crate::config::ClassifierConfig;
use crate::stats::StatisticsRecord;

/// Per-frame motion signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionResult {
    /// Overall amount of motion, 0..=1.
    pub total: f32,
    /// Share attributable to camera / global motion, 0..=1.
    pub global: f32,
    /// Share attributable to object / local motion, 0..=1.
    pub local: f32,
    /// The frame looks like a cut rather than continuous motion.
    pub is_scene_cut: bool,
}

impl MotionResult {
    /// No motion. Returned for the first frame and on any failure.
    pub const ZERO: MotionResult = MotionResult {
        total: 0.0,
        global: 0.0,
        local: 0.0,
        is_scene_cut: false,
    };
}

#[inline]
fn clamp01(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// Classify one frame's flow statistics.
pub fn classify(stats: &StatisticsRecord, total_pixels: u32, config: &ClassifierConfig) -> MotionResult {
    if stats.pixel_count == 0 {
        return MotionResult::ZERO;
    }
    let n = stats.pixel_count as f64;
    let reference = config.reference_magnitude as f64;

    let mean = stats.sum_magnitude / n;
    let variance = (stats.sum_sq_magnitude / n - mean * mean).max(0.0);
    let mean_vec = (stats.sum_vx / n).hypot(stats.sum_vy / n);
    let coherence = if mean > config.epsilon as f64 { clamp01(mean_vec / mean) } else { 0.0 };
    let coverage = if total_pixels == 0 {
        0.0
    } else {
        stats.significant_count as f64 / total_pixels as f64
    };

    let is_scene_cut =
        mean > config.scene_cut_magnitude as f64 && coverage > config.scene_cut_coverage as f64;
    let total = clamp01(mean / reference);

    let (global, local) = if is_scene_cut {
        (total, 0.0)
    } else if coherence > config.coherence_threshold as f64 {
        (total * coherence, total * (1.0 - coherence))
    } else {
        let spread = clamp01(variance.sqrt() / reference);
        (total * coherence, (total * (1.0 - coherence)).max(spread))
    };

    MotionResult {
        total: total as f32,
        global: clamp01(global) as f32,
        local: clamp01(local) as f32,
        is_scene_cut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(mean: f64, vx: f64, vy: f64, n: u32, significant: u32) -> StatisticsRecord {
        StatisticsRecord {
            sum_magnitude: mean * n as f64,
            sum_sq_magnitude: mean * mean * n as f64,
            sum_vx: vx * n as f64,
            sum_vy: vy * n as f64,
            pixel_count: n,
            significant_count: significant,
            max_magnitude: mean as f32,
            histogram: [0.0; 8],
        }
    }

    #[test]
    fn test_empty_record_is_zero() {
        let r = classify(&StatisticsRecord::default(), 100, &ClassifierConfig::default());
        assert_eq!(r, MotionResult::ZERO);
    }

    #[test]
    fn test_coherent_translation_is_global() {
        let r = classify(&record(2.0, 2.0, 0.0, 100, 100), 100, &ClassifierConfig::default());
        assert!((r.total - 0.2).abs() < 1e-6);
        assert!((r.global - 0.2).abs() < 1e-6);
        assert!(r.local.abs() < 1e-6);
        assert!(!r.is_scene_cut);
    }

    #[test]
    fn test_zero_total_pixels_has_no_coverage() {
        let r = classify(&record(9.0, 9.0, 0.0, 100, 100), 0, &ClassifierConfig::default());
        assert!(!r.is_scene_cut);
    }

    #[test]
    fn test_stationary_is_zero() {
        let r = classify(&record(0.0, 0.0, 0.0, 50, 0), 50, &ClassifierConfig::default());
        assert_eq!(r, MotionResult::ZERO);
    }
}
