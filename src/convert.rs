// convert.rs — RGBA → luma conversion (CPU reference of grayscale.wgsl).
//
// ITU-R BT.601 weights on unorm channels: Y = 0.299 R + 0.587 G + 0.114 B,
// with R, G, B in [0, 1]. The GPU reads the frame through an `Rgba8Unorm`
// texture, which performs the /255 normalisation in hardware; we do it
// explicitly here. Alpha is ignored.

use crate::frame::ColorFrame;
use crate::image::Image;

/// BT.601 luma weights for (R, G, B).
pub const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Luma of one RGBA8 pixel, in [0, 1].
#[inline]
pub fn luma(rgba: [u8; 4]) -> f32 {
    (LUMA_WEIGHTS[0] * rgba[0] as f32
        + LUMA_WEIGHTS[1] * rgba[1] as f32
        + LUMA_WEIGHTS[2] * rgba[2] as f32)
        / 255.0
}

/// Convert a whole frame to a luma image in [0, 1].
pub fn luma_image(frame: &ColorFrame) -> Image<f32> {
    Image::from_fn(frame.width() as usize, frame.height() as usize, |x, y| {
        luma(frame.rgba(x as u32, y as u32))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_weights() {
        assert!((luma([255, 0, 0, 255]) - 0.299).abs() < 1e-6);
        assert!((luma([0, 255, 0, 255]) - 0.587).abs() < 1e-6);
        assert!((luma([0, 0, 255, 255]) - 0.114).abs() < 1e-6);
    }

    #[test]
    fn test_white_is_one_and_alpha_ignored() {
        assert!((luma([255, 255, 255, 0]) - 1.0).abs() < 1e-6);
        assert_eq!(luma([0, 0, 0, 255]), 0.0);
    }

    #[test]
    fn test_luma_image_gray_frame() {
        let gray = Image::from_vec(3, 1, vec![0u8, 51, 255]);
        let lum = luma_image(&ColorFrame::from_luma(&gray));
        assert_eq!(lum.width(), 3);
        assert!((lum.get(0, 0) - 0.0).abs() < 1e-6);
        assert!((lum.get(1, 0) - 0.2).abs() < 1e-5);
        assert!((lum.get(2, 0) - 1.0).abs() < 1e-6);
    }
}
