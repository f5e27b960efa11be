// pyramid.rs — Binomial luma pyramid (CPU reference of pyramid.wgsl).
//
// Level 0 is the grayscale frame itself. Every further level is a smoothed
// 2× downsample of the previous one:
//
//   dst(x, y) = Σ_j Σ_i k[i] k[j] · src(2x + i - 2, 2y + j - 2)
//   k = [1, 4, 6, 4, 1] / 16
//
// with clamp-to-edge addressing. The kernel is applied directly at the
// decimated positions, so no full-resolution blurred intermediate is ever
// materialised; the shader does the same in one dispatch per level.
//
// Level dimensions follow max(1, floor(prev / 2)), so a pyramid can be
// built for any non-empty resolution and any level count, and the GPU arena
// allocates its textures from the same `level_dimensions` table.

use crate::image::Image;

/// 5-tap binomial kernel, normalised.
pub const BINOMIAL_KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Dimensions of every level of an `num_levels` pyramid over a
/// `width × height` base image.
pub fn level_dimensions(width: u32, height: u32, num_levels: usize) -> Vec<(u32, u32)> {
    let mut dims = Vec::with_capacity(num_levels);
    let (mut w, mut h) = (width, height);
    for _ in 0..num_levels {
        dims.push((w, h));
        w = (w / 2).max(1);
        h = (h / 2).max(1);
    }
    dims
}

/// A luma pyramid, finest level first.
#[derive(Debug, Clone)]
pub struct Pyramid {
    pub levels: Vec<Image<f32>>,
}

impl Pyramid {
    /// Build a pyramid with `num_levels` levels on top of `base`.
    ///
    /// # Panics
    /// Panics if `num_levels == 0` or the base image is empty.
    pub fn build(base: &Image<f32>, num_levels: usize) -> Self {
        assert!(num_levels >= 1, "pyramid must have at least 1 level");
        assert!(base.width() > 0 && base.height() > 0, "pyramid base must be non-empty");

        let mut levels = Vec::with_capacity(num_levels);
        levels.push(base.clone());
        for k in 1..num_levels {
            let down = downsample_binomial(&levels[k - 1]);
            levels.push(down);
        }
        Pyramid { levels }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize) -> &Image<f32> {
        &self.levels[level]
    }
}

/// One pyramid step: binomial smoothing sampled at even source pixels.
pub fn downsample_binomial(src: &Image<f32>) -> Image<f32> {
    let dst_w = (src.width() / 2).max(1);
    let dst_h = (src.height() / 2).max(1);

    Image::from_fn(dst_w, dst_h, |x, y| {
        let cx = 2 * x as isize;
        let cy = 2 * y as isize;
        let mut acc = 0.0f32;
        for (j, ky) in BINOMIAL_KERNEL.iter().enumerate() {
            let sy = cy + j as isize - 2;
            let mut row = 0.0f32;
            for (i, kx) in BINOMIAL_KERNEL.iter().enumerate() {
                row += kx * src.get_clamped(cx + i as isize - 2, sy);
            }
            acc += ky * row;
        }
        acc
    })
}
