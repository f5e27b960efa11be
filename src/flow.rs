// flow.rs — Dense pyramidal Lucas-Kanade flow (CPU reference of solve.wgsl).
//
// Per pixel of a level, over a (2r+1)² window (window pixels outside the
// image are skipped):
//
//   G = | ΣIx²   ΣIxIy |      b = | ΣIxIt |
//       | ΣIxIy  ΣIy²  |          | ΣIyIt |
//
// If the smaller eigenvalue of G is below `min_eigenvalue` the patch is
// flat or an edge (aperture problem) and the refinement is zero. Otherwise
// δ = -G⁻¹ b. The level's flow is `prior + δ`, where the prior is the next
// coarser flow upsampled ×2 (zero at the coarsest level).
//
// One linearisation per level, no inner iterations: the GPU does one solve
// dispatch per level and this reference reproduces it term for term.

use crate::gradient::GradientSet;
use crate::image::{interpolate_bilinear, Image};
use crate::pyramid::Pyramid;

/// Solver parameters shared by the CPU reference and the GPU kernels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowParams {
    /// Window half-size; the window is (2r+1)².
    pub window_radius: usize,
    /// Minimum structure-tensor eigenvalue for a solve.
    pub min_eigenvalue: f32,
}

impl Default for FlowParams {
    fn default() -> Self {
        FlowParams { window_radius: 2, min_eigenvalue: 1e-3 }
    }
}

/// A dense two-component displacement field in pixels of its own level.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    pub u: Image<f32>,
    pub v: Image<f32>,
}

impl FlowField {
    /// Zero field.
    pub fn new(width: usize, height: usize) -> Self {
        FlowField { u: Image::new(width, height), v: Image::new(width, height) }
    }

    pub fn width(&self) -> usize {
        self.u.width()
    }

    pub fn height(&self) -> usize {
        self.u.height()
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> (f32, f32) {
        (self.u.get(x, y), self.v.get(x, y))
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, (u, v): (f32, f32)) {
        self.u.set(x, y, u);
        self.v.set(x, y, v);
    }

    /// Iterate over every vector in row-major order.
    pub fn vectors(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.u.as_slice().iter().copied().zip(self.v.as_slice().iter().copied())
    }

    /// This field used as the prior of the next finer level, evaluated at
    /// fine pixel (x, y).
    ///
    /// The fine pixel centre maps to coarse coordinate (p + 0.5) / 2 - 0.5;
    /// the bilinear sample is scaled ×2 into fine-level pixels.
    pub fn upsampled_at(&self, x: usize, y: usize) -> (f32, f32) {
        let cx = (x as f32 + 0.5) * 0.5 - 0.5;
        let cy = (y as f32 + 0.5) * 0.5 - 0.5;
        (
            2.0 * interpolate_bilinear(&self.u, cx, cy),
            2.0 * interpolate_bilinear(&self.v, cx, cy),
        )
    }

    /// Mean displacement over the field.
    pub fn mean(&self) -> (f32, f32) {
        let n = (self.width() * self.height()).max(1) as f32;
        let (su, sv) = self.vectors().fold((0.0f32, 0.0f32), |(a, b), (u, v)| (a + u, b + v));
        (su / n, sv / n)
    }
}

/// Smaller eigenvalue of the symmetric 2×2 matrix [[a, b], [b, c]].
#[inline]
pub fn min_eigenvalue(a: f32, b: f32, c: f32) -> f32 {
    let half_trace = 0.5 * (a + c);
    let half_diff = 0.5 * (a - c);
    half_trace - (half_diff * half_diff + b * b).sqrt()
}

/// Solve one level: `prior + δ` at every pixel.
///
/// `coarser` is the flow of the next coarser level, if any.
pub fn solve_level(grad: &GradientSet, coarser: Option<&FlowField>, params: &FlowParams) -> FlowField {
    let (w, h) = (grad.width(), grad.height());
    let r = params.window_radius as isize;
    let mut out = FlowField::new(w, h);

    for y in 0..h {
        for x in 0..w {
            let (mut sxx, mut sxy, mut syy, mut sxt, mut syt) = (0.0f32, 0.0f32, 0.0f32, 0.0f32, 0.0f32);
            for dy in -r..=r {
                let wy = y as isize + dy;
                if wy < 0 || wy >= h as isize {
                    continue;
                }
                for dx in -r..=r {
                    let wx = x as isize + dx;
                    if wx < 0 || wx >= w as isize {
                        continue;
                    }
                    let (wx, wy) = (wx as usize, wy as usize);
                    let gx = grad.ix.get(wx, wy);
                    let gy = grad.iy.get(wx, wy);
                    let gt = grad.it.get(wx, wy);
                    sxx += gx * gx;
                    sxy += gx * gy;
                    syy += gy * gy;
                    sxt += gx * gt;
                    syt += gy * gt;
                }
            }

            let prior = coarser.map_or((0.0, 0.0), |c| c.upsampled_at(x, y));
            let mut delta = (0.0f32, 0.0f32);
            if min_eigenvalue(sxx, sxy, syy) >= params.min_eigenvalue {
                let det = sxx * syy - sxy * sxy;
                delta = (
                    -(syy * sxt - sxy * syt) / det,
                    -(sxx * syt - sxy * sxt) / det,
                );
            }
            out.set(x, y, (prior.0 + delta.0, prior.1 + delta.1));
        }
    }
    out
}

/// Coarse-to-fine flow from `previous` to `current`. Returns one field per
/// level, finest first.
///
/// # Panics
/// Panics if the pyramids differ in depth or level sizes.
pub fn estimate_flow_levels(previous: &Pyramid, current: &Pyramid, params: &FlowParams) -> Vec<FlowField> {
    assert_eq!(
        previous.num_levels(),
        current.num_levels(),
        "pyramids must have the same number of levels"
    );
    let n = current.num_levels();
    let mut fields: Vec<Option<FlowField>> = vec![None; n];
    for level in (0..n).rev() {
        let coarser = fields.get(level + 1).and_then(|f| f.as_ref());
        let grad = GradientSet::compute(current.level(level), previous.level(level), coarser);
        let field = solve_level(&grad, coarser, params);
        fields[level] = Some(field);
    }
    fields.into_iter().flatten().collect()
}

/// Finest-level flow from `previous` to `current`.
pub fn estimate_flow(previous: &Pyramid, current: &Pyramid, params: &FlowParams) -> FlowField {
    estimate_flow_levels(previous, current, params)
        .into_iter()
        .next()
        .unwrap_or_else(|| FlowField::new(0, 0))
}
