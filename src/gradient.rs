// gradient.rs — Spatial and temporal gradients for one pyramid level
// (CPU reference of gradient.wgsl).
//
// For pixel p with prior displacement u0(p) (the upsampled coarser flow,
// zero at the coarsest level) the current level is sampled at the warped
// point q = p + u0(p):
//
//   Ix = (C(q + x̂) - C(q - x̂)) / 2
//   Iy = (C(q + ŷ) - C(q - ŷ)) / 2
//   It =  C(q) - P(p)
//
// C is sampled bilinearly with clamp-to-edge. Without a prior q == p and
// these reduce to plain centred differences and a pixelwise difference.
// Evaluating the current frame at the warped point makes the solver's
// output a refinement of u0 rather than a second estimate of the whole
// displacement.

use crate::flow::FlowField;
use crate::image::{interpolate_bilinear, Image};

/// Ix, Iy, It at one pyramid level.
#[derive(Debug, Clone)]
pub struct GradientSet {
    pub ix: Image<f32>,
    pub iy: Image<f32>,
    pub it: Image<f32>,
}

impl GradientSet {
    /// Gradients of `current` against `previous`, both at the same level.
    ///
    /// `coarser` is the flow estimated at the next-coarser level, if any.
    ///
    /// # Panics
    /// Panics if the two images differ in size.
    pub fn compute(current: &Image<f32>, previous: &Image<f32>, coarser: Option<&FlowField>) -> Self {
        assert!(
            current.width() == previous.width() && current.height() == previous.height(),
            "current and previous levels must have the same dimensions"
        );
        let (w, h) = (current.width(), current.height());
        let mut ix = Image::new(w, h);
        let mut iy = Image::new(w, h);
        let mut it = Image::new(w, h);

        for y in 0..h {
            for x in 0..w {
                let (u0x, u0y) = coarser.map_or((0.0, 0.0), |c| c.upsampled_at(x, y));
                let qx = x as f32 + u0x;
                let qy = y as f32 + u0y;

                let gx = (interpolate_bilinear(current, qx + 1.0, qy)
                    - interpolate_bilinear(current, qx - 1.0, qy))
                    * 0.5;
                let gy = (interpolate_bilinear(current, qx, qy + 1.0)
                    - interpolate_bilinear(current, qx, qy - 1.0))
                    * 0.5;
                let gt = interpolate_bilinear(current, qx, qy) - previous.get(x, y);

                ix.set(x, y, gx);
                iy.set(x, y, gy);
                it.set(x, y, gt);
            }
        }
        GradientSet { ix, iy, it }
    }

    pub fn width(&self) -> usize {
        self.ix.width()
    }

    pub fn height(&self) -> usize {
        self.ix.height()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_gradients() {
        // C(x, y) = 0.01 x + 0.02 y, P = C - 0.05.
        let cur = Image::from_fn(10, 8, |x, y| 0.01 * x as f32 + 0.02 * y as f32);
        let prev = Image::from_fn(10, 8, |x, y| 0.01 * x as f32 + 0.02 * y as f32 - 0.05);
        let g = GradientSet::compute(&cur, &prev, None);
        for y in 1..7 {
            for x in 1..9 {
                assert!((g.ix.get(x, y) - 0.01).abs() < 1e-6);
                assert!((g.iy.get(x, y) - 0.02).abs() < 1e-6);
                assert!((g.it.get(x, y) - 0.05).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_border_uses_clamped_neighbour() {
        let cur = Image::from_fn(4, 1, |x, _| x as f32);
        let g = GradientSet::compute(&cur, &cur, None);
        assert!((g.ix.get(0, 0) - 0.5).abs() < 1e-6);
        assert!((g.ix.get(3, 0) - 0.5).abs() < 1e-6);
        assert!((g.ix.get(1, 0) - 1.0).abs() < 1e-6);
        assert_eq!(g.iy.get(2, 0), 0.0);
    }

    #[test]
    fn test_identical_frames_have_zero_temporal_gradient() {
        let img = Image::from_fn(12, 12, |x, y| ((x * 7 + y * 3) % 11) as f32 / 11.0);
        let g = GradientSet::compute(&img, &img, None);
        assert!(g.it.pixels().all(|(_, _, v)| v == 0.0));
    }

    #[test]
    fn test_exact_prior_cancels_temporal_gradient() {
        // Previous is a ramp, current is it shifted right by 2 px. A coarser
        // flow of 1 px (upsampled ×2) warps the current frame back exactly.
        let prev = Image::from_fn(16, 8, |x, _| 0.02 * x as f32);
        let cur = Image::from_fn(16, 8, |x, _| 0.02 * (x as f32 - 2.0));
        let mut coarse = FlowField::new(8, 4);
        for y in 0..4 {
            for x in 0..8 {
                coarse.set(x, y, (1.0, 0.0));
            }
        }
        let g = GradientSet::compute(&cur, &prev, Some(&coarse));
        for x in 2..12 {
            assert!(g.it.get(x, 4).abs() < 1e-5, "It at x={x} is {}", g.it.get(x, 4));
        }
    }
}
