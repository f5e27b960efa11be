// image.rs — Compact single-channel image container for the CPU reference path.
//
// Every image in the analyzer lives at a fixed, small analysis resolution
// (160×90 by default), so rows are always tightly packed: stride == width.
// The container is generic over the pixel type: test fixtures are written
// as `Image<u8>` (see `ColorFrame::from_luma`) while the pipeline itself
// works in `Image<f32>` luma.
//
// GPU EQUIVALENT: an `R32Float` texture. `interpolate_bilinear` reproduces
// the clamp-to-edge bilinear fetch used by the WGSL kernels in
// `shaders/common.wgsl`, so CPU and GPU agree to float rounding.

use std::fmt;

/// Pixel types that can be stored in an [`Image`].
pub trait Pixel: Copy + Default + Send + Sync + PartialOrd + 'static {}

impl Pixel for u8 {}
impl Pixel for f32 {}

/// A row-major 2D image with runtime dimensions.
#[derive(Clone, PartialEq)]
pub struct Image<T: Pixel> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

impl<T: Pixel> Image<T> {
    /// Zero-initialised image.
    pub fn new(width: usize, height: usize) -> Self {
        Image {
            data: vec![T::default(); width * height],
            width,
            height,
        }
    }

    /// Wrap an existing row-major pixel vector.
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length ({}) must equal width * height ({})",
            data.len(),
            width * height,
        );
        Image { data, width, height }
    }

    /// Build an image by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Image { data, width, height }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel at column `x`, row `y`.
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) out of bounds for {}x{} image",
            self.width,
            self.height
        );
        self.data[y * self.width + x]
    }

    /// Pixel at a signed coordinate, clamped to the nearest edge pixel.
    ///
    /// Mirrors `textureLoad` on a clamped coordinate in the shaders.
    #[inline]
    pub fn get_clamped(&self, x: isize, y: isize) -> T {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        self.data[cy * self.width + cx]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) out of bounds for {}x{} image",
            self.width,
            self.height
        );
        self.data[y * self.width + x] = value;
    }

    /// Iterate over `(x, y, value)` in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        let w = self.width;
        self.data
            .iter()
            .enumerate()
            .map(move |(i, &v)| (i % w, i / w, v))
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}

impl<T: Pixel + fmt::Debug> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Image<{}x{}>", self.width, self.height)?;
        if self.width * self.height <= 64 {
            for y in 0..self.height {
                write!(f, "\n  ")?;
                for x in 0..self.width {
                    write!(f, "{:?} ", self.get(x, y))?;
                }
            }
        }
        Ok(())
    }
}

/// Bilinear interpolation with clamp-to-edge addressing.
///
/// The coordinate is clamped to `[0, w-1] × [0, h-1]` before the four
/// neighbours are fetched, exactly as `bilinear()` does in
/// `shaders/common.wgsl`.
///
/// # Panics
/// Panics if the image is empty.
pub fn interpolate_bilinear(img: &Image<f32>, x: f32, y: f32) -> f32 {
    assert!(img.width() > 0 && img.height() > 0, "cannot interpolate on an empty image");

    let x = x.clamp(0.0, (img.width() - 1) as f32);
    let y = y.clamp(0.0, (img.height() - 1) as f32);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let x1 = (x0 + 1).min(img.width() - 1);
    let y1 = (y0 + 1).min(img.height() - 1);

    let top = img.get(x0, y0) * (1.0 - fx) + img.get(x1, y0) * fx;
    let bottom = img.get(x0, y1) * (1.0 - fx) + img.get(x1, y1) * fx;
    top * (1.0 - fy) + bottom * fy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let img: Image<u8> = Image::new(10, 5);
        assert_eq!(img.width(), 10);
        assert_eq!(img.height(), 5);
        assert!(img.pixels().all(|(_, _, v)| v == 0));
    }

    #[test]
    fn test_from_vec_row_major() {
        let img = Image::from_vec(4, 3, (0u8..12).collect());
        assert_eq!(img.get(0, 0), 0);
        assert_eq!(img.get(3, 0), 3);
        assert_eq!(img.get(0, 1), 4);
        assert_eq!(img.get(3, 2), 11);
    }

    #[test]
    #[should_panic(expected = "must equal width * height")]
    fn test_from_vec_wrong_length_panics() {
        Image::from_vec(4, 3, vec![0u8; 11]);
    }

    #[test]
    fn test_get_clamped_replicates_edges() {
        let img = Image::from_fn(3, 2, |x, y| (x + 10 * y) as f32);
        assert_eq!(img.get_clamped(-5, 0), 0.0);
        assert_eq!(img.get_clamped(7, 0), 2.0);
        assert_eq!(img.get_clamped(1, 9), 11.0);
    }

    #[test]
    fn test_bilinear_exact_at_integer_coords() {
        let img = Image::from_fn(4, 4, |x, y| (x * 3 + y * 7) as f32);
        for y in 0..4 {
            for x in 0..4 {
                let v = interpolate_bilinear(&img, x as f32, y as f32);
                assert!((v - img.get(x, y)).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_bilinear_midpoint_of_ramp() {
        // f(x, y) = x is linear, so bilinear is exact between samples.
        let img = Image::from_fn(5, 5, |x, _| x as f32);
        let v = interpolate_bilinear(&img, 1.25, 2.5);
        assert!((v - 1.25).abs() < 1e-6, "got {v}");
    }

    #[test]
    fn test_bilinear_clamps_outside() {
        let img = Image::from_fn(3, 3, |x, _| x as f32);
        assert!((interpolate_bilinear(&img, -4.0, 1.0) - 0.0).abs() < 1e-6);
        assert!((interpolate_bilinear(&img, 10.0, 1.0) - 2.0).abs() < 1e-6);
    }
}
