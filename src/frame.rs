// frame.rs — Color frame handed to the analyzer by the decode pipeline.
//
// The decoder/compositor scales frames to the analysis resolution before
// they reach us; the analyzer only checks that the buffer is the size it
// claims to be. Layout is tightly packed RGBA8, row-major, which uploads
// straight into the arena's `Rgba8Unorm` texture.

use crate::error::AnalyzerError;
use crate::image::Image;

/// Bytes per RGBA8 pixel.
pub const RGBA_BYTES_PER_PIXEL: usize = 4;

/// A tightly packed RGBA8 bitmap.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl ColorFrame {
    /// Wrap an RGBA8 buffer of exactly `width * height * 4` bytes.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self, AnalyzerError> {
        let expected = width as usize * height as usize * RGBA_BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(AnalyzerError::FrameBuffer { width, height, expected, got: data.len() });
        }
        Ok(ColorFrame { width, height, data })
    }

    /// Replicate a grayscale image into the RGB channels (alpha = 255).
    pub fn from_luma(img: &Image<u8>) -> Self {
        let mut data = Vec::with_capacity(img.width() * img.height() * RGBA_BYTES_PER_PIXEL);
        for &v in img.as_slice() {
            data.extend_from_slice(&[v, v, v, 255]);
        }
        ColorFrame {
            width: img.width() as u32,
            height: img.height() as u32,
            data,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA8 bytes, row-major, no padding.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// RGBA bytes of the pixel at (x, y).
    #[inline]
    pub fn rgba(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * RGBA_BYTES_PER_PIXEL;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }
}
