// config.rs — Analyzer and classifier configuration.
//
// Both structs carry tuned defaults. The motion, coherence and scene-cut
// thresholds were tuned against the 5-tap binomial pyramid kernel, the
// 5×5 Lucas-Kanade window and luma in [0, 1]; changing any of those
// shifts the flow statistics and the thresholds need re-tuning with them.
//
// Configs derive serde so a host application can keep them in its own
// settings file; `validate()` is called by `MotionAnalyzer::initialize`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::flow::FlowParams;
use crate::gpu::device::DeviceProfile;

/// Largest supported analysis width or height. Keeps `width * height`
/// and the fixed-point pixel counters well inside `u32`.
pub const MAX_ANALYSIS_DIMENSION: u32 = 8192;

/// Largest supported pyramid depth.
pub const MAX_PYRAMID_LEVELS: usize = 8;

/// Largest supported Lucas-Kanade window radius (11×11 window).
pub const MAX_WINDOW_RADIUS: u32 = 5;

/// Fixed-point scale used for atomic accumulation of flow statistics.
pub const FIXED_POINT_SCALE: f32 = 1000.0;

/// Per-pixel magnitude cap (pixels/frame at analysis resolution) applied
/// before fixed-point accumulation. Keeps every 32-bit workgroup partial
/// sum of squared magnitudes in range for workgroups of up to 256
/// invocations.
pub const MAX_ACCUMULATED_MAGNITUDE: f32 = 64.0;

/// Number of direction histogram bins.
pub const DIRECTION_BINS: usize = 8;

/// Configuration of the GPU analysis pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Fixed analysis width. Frames must already be scaled to it.
    pub width: u32,
    /// Fixed analysis height.
    pub height: u32,
    /// Number of pyramid levels (level 0 = grayscale frame).
    pub pyramid_levels: usize,
    /// Lucas-Kanade window radius; the window is (2r+1)².
    pub window_radius: u32,
    /// Smallest structure-tensor eigenvalue (luma² units) for which the
    /// local least-squares system is solved.
    pub min_eigenvalue: f32,
    /// Flow magnitude (pixels/frame) above which a pixel counts as moving.
    pub significance_threshold: f32,
    /// Hardware profile for device limits and workgroup size.
    pub profile: DeviceProfile,
    /// Upper bound on the host wait for the statistics readback.
    /// `None` waits indefinitely.
    pub readback_timeout: Option<Duration>,
    /// Thresholds of the host-side classifier.
    pub classifier: ClassifierConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            width: 160,
            height: 90,
            pyramid_levels: 3,
            window_radius: 2,
            min_eigenvalue: 1e-3,
            significance_threshold: 0.5,
            profile: DeviceProfile::Native,
            readback_timeout: Some(Duration::from_secs(2)),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Check every value the pipeline depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::EmptyResolution { width: self.width, height: self.height });
        }
        if self.width > MAX_ANALYSIS_DIMENSION || self.height > MAX_ANALYSIS_DIMENSION {
            return Err(ConfigError::ResolutionTooLarge {
                width: self.width,
                height: self.height,
                max: MAX_ANALYSIS_DIMENSION,
            });
        }
        if self.pyramid_levels == 0 || self.pyramid_levels > MAX_PYRAMID_LEVELS {
            return Err(ConfigError::PyramidLevels {
                levels: self.pyramid_levels,
                max: MAX_PYRAMID_LEVELS,
            });
        }
        if self.window_radius == 0 || self.window_radius > MAX_WINDOW_RADIUS {
            return Err(ConfigError::WindowRadius {
                radius: self.window_radius,
                max: MAX_WINDOW_RADIUS,
            });
        }
        // min_eigenvalue > 0 also guarantees det(G) > 0 whenever the solve runs.
        require_positive("min_eigenvalue", self.min_eigenvalue)?;
        require_positive("significance_threshold", self.significance_threshold)?;
        self.classifier.validate()
    }

    /// Total number of pixels at analysis resolution. Saturates for
    /// resolutions `validate()` would reject.
    pub fn total_pixels(&self) -> u32 {
        self.width.saturating_mul(self.height)
    }

    /// Solver parameters shared by the CPU reference and the GPU kernels.
    pub fn flow_params(&self) -> FlowParams {
        FlowParams {
            window_radius: self.window_radius as usize,
            min_eigenvalue: self.min_eigenvalue,
        }
    }
}

/// Thresholds of the motion classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Mean magnitude (pixels/frame) that maps to `total = 1.0`.
    pub reference_magnitude: f32,
    /// Mean magnitude above which a frame may be a scene cut.
    pub scene_cut_magnitude: f32,
    /// Fraction of significant pixels above which a frame may be a scene cut.
    pub scene_cut_coverage: f32,
    /// Coherence above which motion is treated as mostly camera motion.
    pub coherence_threshold: f32,
    /// Mean magnitudes at or below this are treated as no motion when
    /// computing coherence.
    pub epsilon: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            reference_magnitude: 10.0,
            scene_cut_magnitude: 8.0,
            scene_cut_coverage: 0.7,
            coherence_threshold: 0.6,
            epsilon: 1e-3,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("reference_magnitude", self.reference_magnitude)?;
        require_positive("scene_cut_magnitude", self.scene_cut_magnitude)?;
        require_positive("epsilon", self.epsilon)?;
        require_unit("scene_cut_coverage", self.scene_cut_coverage)?;
        require_unit("coherence_threshold", self.coherence_threshold)
    }
}

fn require_positive(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

fn require_unit(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::NotUnit { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(AnalyzerConfig::default().validate(), Ok(()));
        assert_eq!(AnalyzerConfig::default().total_pixels(), 160 * 90);
    }

    #[test]
    fn test_rejects_empty_resolution() {
        let cfg = AnalyzerConfig { width: 0, ..Default::default() };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::EmptyResolution { width: 0, height: 90 })
        );
    }

    #[test]
    fn test_rejects_oversized_resolution() {
        let cfg = AnalyzerConfig { width: MAX_ANALYSIS_DIMENSION + 1, ..Default::default() };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ResolutionTooLarge {
                width: MAX_ANALYSIS_DIMENSION + 1,
                height: 90,
                max: MAX_ANALYSIS_DIMENSION,
            })
        );
        let cfg = AnalyzerConfig {
            width: MAX_ANALYSIS_DIMENSION,
            height: MAX_ANALYSIS_DIMENSION,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Ok(()));
        assert_eq!(cfg.total_pixels(), MAX_ANALYSIS_DIMENSION * MAX_ANALYSIS_DIMENSION);
    }

    #[test]
    fn test_total_pixels_saturates() {
        let cfg = AnalyzerConfig { width: u32::MAX, height: u32::MAX, ..Default::default() };
        assert_eq!(cfg.total_pixels(), u32::MAX);
        assert!(matches!(cfg.validate(), Err(ConfigError::ResolutionTooLarge { .. })));
    }

    #[test]
    fn test_rejects_level_count() {
        for levels in [0, MAX_PYRAMID_LEVELS + 1] {
            let cfg = AnalyzerConfig { pyramid_levels: levels, ..Default::default() };
            assert!(matches!(cfg.validate(), Err(ConfigError::PyramidLevels { .. })));
        }
    }

    #[test]
    fn test_rejects_window_radius() {
        let cfg = AnalyzerConfig { window_radius: 0, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::WindowRadius { .. })));
    }

    #[test]
    fn test_rejects_non_positive_eigenvalue() {
        for v in [0.0, -1.0, f32::NAN] {
            let cfg = AnalyzerConfig { min_eigenvalue: v, ..Default::default() };
            assert!(
                matches!(cfg.validate(), Err(ConfigError::NotPositive { name: "min_eigenvalue", .. })),
                "{v} accepted"
            );
        }
    }

    #[test]
    fn test_rejects_coverage_outside_unit_range() {
        let classifier = ClassifierConfig { scene_cut_coverage: 1.5, ..Default::default() };
        let cfg = AnalyzerConfig { classifier, ..Default::default() };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NotUnit { name: "scene_cut_coverage", .. })
        ));
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let cfg: AnalyzerConfig =
            serde_json::from_str(r#"{ "width": 320, "height": 180 }"#).unwrap();
        assert_eq!(cfg.width, 320);
        assert_eq!(cfg.height, 180);
        assert_eq!(cfg.pyramid_levels, 3);
        assert_eq!(cfg.classifier, ClassifierConfig::default());
    }
}
