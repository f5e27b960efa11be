// stats.rs — Fixed-point flow statistics (CPU reference of stats.wgsl).
//
// Every per-pixel contribution is scaled by FIXED_POINT_SCALE and rounded
// to an integer before it is summed. Integer addition is associative, so
// the GPU's atomics produce the same record whatever order the invocations
// run in. Given the same flow vectors this accumulator reproduces the GPU
// record up to the float rounding of the per-pixel terms.
//
// Per pixel:
//   m   = |v|, clamped to MAX_ACCUMULATED_MAGNITUDE (v scaled to match)
//   bin = floor((atan2(vy, vx) + π) / 2π · 8), clamped to 0..7
//   sum_magnitude += q(m)        sum_sq_magnitude += q(m²)
//   sum_vx += q(vx)              sum_vy += q(vy)
//   histogram[bin] += q(m)       max_magnitude = max(., q(m))
//   pixel_count += 1             significant_count += (m > threshold)
// with q(x) = round_ties_even(x · 1000).
//
// The 64-bit sums are stored on the GPU as (lo, hi) u32 pairs; `RawStatistics`
// is the exact byte image of that buffer.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::config::{DIRECTION_BINS, FIXED_POINT_SCALE, MAX_ACCUMULATED_MAGNITUDE};
use crate::flow::FlowField;

/// Size of the statistics buffer in 32-bit words.
pub const STATS_WORDS: usize = 28;

/// Byte image of the GPU statistics buffer.
///
/// 64-bit accumulators are `[lo, hi]`. Signed sums are two's complement.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RawStatistics {
    pub sum_magnitude: [u32; 2],
    pub sum_sq_magnitude: [u32; 2],
    pub sum_vx: [u32; 2],
    pub sum_vy: [u32; 2],
    pub pixel_count: u32,
    pub significant_count: u32,
    pub max_magnitude: u32,
    pub _pad: u32,
    pub histogram: [[u32; 2]; DIRECTION_BINS],
}

const _: () = assert!(std::mem::size_of::<RawStatistics>() == STATS_WORDS * 4);

#[inline]
fn join(pair: [u32; 2]) -> u64 {
    (pair[1] as u64) << 32 | pair[0] as u64
}

#[inline]
fn split(v: u64) -> [u32; 2] {
    [v as u32, (v >> 32) as u32]
}

/// Summary statistics of one flow field, in pixels of the analysis
/// resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsRecord {
    pub sum_magnitude: f64,
    pub sum_sq_magnitude: f64,
    pub sum_vx: f64,
    pub sum_vy: f64,
    pub pixel_count: u32,
    pub significant_count: u32,
    pub max_magnitude: f32,
    /// Magnitude-weighted direction histogram, bin 0 starting at angle -π.
    pub histogram: [f64; DIRECTION_BINS],
}

impl StatisticsRecord {
    /// Mean flow magnitude, 0 for an empty record.
    pub fn mean_magnitude(&self) -> f64 {
        if self.pixel_count == 0 {
            0.0
        } else {
            self.sum_magnitude / self.pixel_count as f64
        }
    }
}

impl From<RawStatistics> for StatisticsRecord {
    fn from(raw: RawStatistics) -> Self {
        let scale = FIXED_POINT_SCALE as f64;
        StatisticsRecord {
            sum_magnitude: join(raw.sum_magnitude) as f64 / scale,
            sum_sq_magnitude: join(raw.sum_sq_magnitude) as f64 / scale,
            sum_vx: join(raw.sum_vx) as i64 as f64 / scale,
            sum_vy: join(raw.sum_vy) as i64 as f64 / scale,
            pixel_count: raw.pixel_count,
            significant_count: raw.significant_count,
            max_magnitude: (raw.max_magnitude as f64 / scale) as f32,
            histogram: raw.histogram.map(|bin| join(bin) as f64 / scale),
        }
    }
}

/// Direction bin of a flow vector.
#[inline]
pub fn direction_bin(vx: f32, vy: f32) -> usize {
    let turn = (vy.atan2(vx) + std::f32::consts::PI) / std::f32::consts::TAU;
    ((turn * DIRECTION_BINS as f32).floor() as i32).clamp(0, DIRECTION_BINS as i32 - 1) as usize
}

#[inline]
fn quantize(v: f32) -> i32 {
    (v * FIXED_POINT_SCALE).round_ties_even() as i32
}

/// Integer accumulator with the same arithmetic as the reduction shader.
#[derive(Debug, Clone, Default)]
pub struct FixedPointAccumulator {
    sum_magnitude: u64,
    sum_sq_magnitude: u64,
    sum_vx: i64,
    sum_vy: i64,
    pixel_count: u32,
    significant_count: u32,
    max_magnitude: u32,
    histogram: [u64; DIRECTION_BINS],
    significance: f32,
}

impl FixedPointAccumulator {
    pub fn new(significance_threshold: f32) -> Self {
        FixedPointAccumulator { significance: significance_threshold, ..Default::default() }
    }

    /// Add one flow vector.
    pub fn add(&mut self, vx: f32, vy: f32) {
        let mut m = (vx * vx + vy * vy).sqrt();
        let (mut vx, mut vy) = (vx, vy);
        if m > MAX_ACCUMULATED_MAGNITUDE {
            let s = MAX_ACCUMULATED_MAGNITUDE / m;
            vx *= s;
            vy *= s;
            m = MAX_ACCUMULATED_MAGNITUDE;
        }
        let qm = quantize(m);

        self.sum_magnitude += qm as u64;
        self.sum_sq_magnitude += quantize(m * m) as u64;
        self.sum_vx += quantize(vx) as i64;
        self.sum_vy += quantize(vy) as i64;
        self.histogram[direction_bin(vx, vy)] += qm as u64;
        self.max_magnitude = self.max_magnitude.max(qm as u32);
        self.pixel_count += 1;
        if m > self.significance {
            self.significant_count += 1;
        }
    }

    /// Fold another accumulator in (partial sums of a split field).
    pub fn merge(&mut self, other: &FixedPointAccumulator) {
        self.sum_magnitude += other.sum_magnitude;
        self.sum_sq_magnitude += other.sum_sq_magnitude;
        self.sum_vx += other.sum_vx;
        self.sum_vy += other.sum_vy;
        self.pixel_count += other.pixel_count;
        self.significant_count += other.significant_count;
        self.max_magnitude = self.max_magnitude.max(other.max_magnitude);
        for (a, b) in self.histogram.iter_mut().zip(other.histogram) {
            *a += b;
        }
    }

    /// The buffer image the GPU would have produced for the same vectors.
    pub fn to_raw(&self) -> RawStatistics {
        RawStatistics {
            sum_magnitude: split(self.sum_magnitude),
            sum_sq_magnitude: split(self.sum_sq_magnitude),
            sum_vx: split(self.sum_vx as u64),
            sum_vy: split(self.sum_vy as u64),
            pixel_count: self.pixel_count,
            significant_count: self.significant_count,
            max_magnitude: self.max_magnitude,
            _pad: 0,
            histogram: self.histogram.map(split),
        }
    }

    pub fn record(&self) -> StatisticsRecord {
        StatisticsRecord::from(self.to_raw())
    }
}

/// Statistics of a whole flow field.
pub fn accumulate(flow: &FlowField, significance_threshold: f32) -> StatisticsRecord {
    let mut acc = FixedPointAccumulator::new(significance_threshold);
    for (u, v) in flow.vectors() {
        acc.add(u, v);
    }
    acc.record()
}
