// gpu/pipeline.rs — The per-frame command batch.
//
// `MotionPipeline` owns the resource arena, every compiled kernel and
// every precreated bind group. `run_frame` records one command buffer:
//
//   upload → grayscale → pyramid                     (always)
//   flow passes coarse→fine → clear → reduce → copy  (only with a previous frame)
//
// submits it inside Validation and OutOfMemory error scopes and, when
// statistics were produced, maps the readback buffer. This is the only
// place the host waits on the device.
//
// The pipeline holds no temporal state: which slot is current and whether a
// previous frame exists are decided by the caller (`MotionAnalyzer`).

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::AnalyzerConfig;
use crate::error::AnalyzerError;
use crate::frame::ColorFrame;
use crate::gpu::arena::ResourceArena;
use crate::gpu::device::{GpuDevice, GpuError, MAX_WORKGROUP_INVOCATIONS};
use crate::gpu::flow::{FlowBindings, FlowKernels};
use crate::gpu::grayscale::{GrayscaleBindings, GrayscaleKernel};
use crate::gpu::pyramid::{PyramidBindings, PyramidKernel};
use crate::gpu::stats::{StatsBindings, StatsKernel};
use crate::stats::RawStatistics;

pub struct MotionPipeline {
    gpu: Arc<GpuDevice>,
    arena: ResourceArena,
    grayscale: GrayscaleKernel,
    grayscale_bindings: GrayscaleBindings,
    pyramid: PyramidKernel,
    pyramid_bindings: PyramidBindings,
    flow: FlowKernels,
    flow_bindings: FlowBindings,
    stats: StatsKernel,
    stats_bindings: StatsBindings,
}

impl MotionPipeline {
    /// Compile every kernel and allocate the arena for a validated config.
    ///
    /// Shader or layout errors are captured by an error scope and returned
    /// as `AnalyzerError::Device`.
    pub fn new(gpu: Arc<GpuDevice>, config: &AnalyzerConfig) -> Result<Self, AnalyzerError> {
        let total = gpu.workgroup_size.total();
        if total > u64::from(MAX_WORKGROUP_INVOCATIONS) {
            return Err(GpuError::WorkgroupTooLarge { total, max: MAX_WORKGROUP_INVOCATIONS }.into());
        }

        gpu.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let arena = ResourceArena::new(&gpu, config);
        let grayscale = GrayscaleKernel::new(&gpu);
        let pyramid = PyramidKernel::new(&gpu);
        let flow = FlowKernels::new(&gpu, config.window_radius);
        let stats = StatsKernel::new(&gpu);
        let grayscale_bindings = grayscale.bind(&gpu, &arena);
        let pyramid_bindings = pyramid.bind(&gpu, &arena);
        let flow_bindings = flow.bind(&gpu, &arena);
        let stats_bindings = stats.bind(&gpu, &arena);

        pop_error_scopes(&gpu.device)?;

        Ok(MotionPipeline {
            gpu,
            arena,
            grayscale,
            grayscale_bindings,
            pyramid,
            pyramid_bindings,
            flow,
            flow_bindings,
            stats,
            stats_bindings,
        })
    }

    pub fn gpu(&self) -> &Arc<GpuDevice> {
        &self.gpu
    }

    pub fn arena(&self) -> &ResourceArena {
        &self.arena
    }

    /// Run one frame with its pyramid in slot `parity`.
    ///
    /// Returns `Ok(None)` when `has_previous` is false: the pyramid is built
    /// for the next frame to compare against, and nothing is read back.
    pub fn run_frame(
        &self,
        frame: &ColorFrame,
        parity: usize,
        has_previous: bool,
        readback_timeout: Option<Duration>,
    ) -> Result<Option<RawStatistics>, AnalyzerError> {
        let gpu = &*self.gpu;
        gpu.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);

        self.arena.upload_frame(gpu, frame);

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("MotionPipeline::run_frame"),
        });
        self.grayscale.encode(gpu, &mut encoder, &self.grayscale_bindings, &self.arena, parity);
        self.pyramid.encode(gpu, &mut encoder, &self.pyramid_bindings, &self.arena, parity);
        if has_previous {
            self.flow.encode(gpu, &mut encoder, &self.flow_bindings, &self.arena, parity);
            self.stats.encode(gpu, &mut encoder, &self.stats_bindings, &self.arena);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));

        pop_error_scopes(&gpu.device)?;

        if !has_previous {
            debug!(parity, "first frame: pyramid built, no flow");
            return Ok(None);
        }
        self.arena.read_statistics(gpu, readback_timeout).map(Some)
    }
}

/// Pop the Validation then OutOfMemory scopes pushed by the caller.
fn pop_error_scopes(device: &wgpu::Device) -> Result<(), AnalyzerError> {
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    match validation.or(out_of_memory) {
        Some(e) => Err(AnalyzerError::Device(e.to_string())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::luma_image;
    use crate::flow::estimate_flow;
    use crate::gradient::GradientSet;
    use crate::image::Image;
    use crate::pyramid::Pyramid;
    use crate::stats::{accumulate, StatisticsRecord};

    fn run_gpu_test(name: &str) -> String {
        let out = std::process::Command::new("cargo")
            .args(["test", "--lib", "--", name, "--exact", "--ignored", "--nocapture"])
            .output()
            .unwrap_or_else(|e| panic!("subprocess failed: {e}"));
        String::from_utf8_lossy(&out.stdout).into_owned()
            + &String::from_utf8_lossy(&out.stderr)
    }

    fn textured_frame(w: usize, h: usize, dx: f32, dy: f32) -> ColorFrame {
        let img = Image::from_fn(w, h, |x, y| {
            let (x, y) = (x as f32 - dx, y as f32 - dy);
            (128.0 + 50.0 * (0.35 * x).sin() + 50.0 * (0.3 * y).cos()).round() as u8
        });
        ColorFrame::from_luma(&img)
    }

    fn pipeline(config: &AnalyzerConfig) -> MotionPipeline {
        let gpu = Arc::new(GpuDevice::new_with_profile(config.profile).expect("GPU device"));
        MotionPipeline::new(gpu, config).expect("pipeline")
    }

    // ---- inner GPU tests (subprocess-isolated) ----------------------------

    #[test]
    #[ignore = "GPU integration"]
    fn inner_pyramid_matches_cpu() {
        let config = AnalyzerConfig::default();
        let p = pipeline(&config);
        let frame = textured_frame(160, 90, 0.0, 0.0);
        assert!(p.run_frame(&frame, 1, false, None).unwrap().is_none());

        let cpu = Pyramid::build(&luma_image(&frame), config.pyramid_levels);
        for level in 0..config.pyramid_levels {
            let gpu_level = p.arena().readback_level(p.gpu(), 1, level).unwrap();
            let want = cpu.level(level);
            assert_eq!((gpu_level.width(), gpu_level.height()), (want.width(), want.height()));
            for (x, y, v) in want.pixels() {
                let got = gpu_level.get(x, y);
                assert!((got - v).abs() < 1e-5, "level {level} ({x}, {y}): gpu {got} cpu {v}");
            }
        }
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration"]
    fn inner_coarsest_gradients_match_cpu() {
        let config = AnalyzerConfig::default();
        let p = pipeline(&config);
        let a = textured_frame(160, 90, 0.0, 0.0);
        let b = textured_frame(160, 90, 1.0, 0.0);
        p.run_frame(&a, 0, false, None).unwrap();
        p.run_frame(&b, 1, true, None).unwrap();

        let top = config.pyramid_levels - 1;
        let prev = Pyramid::build(&luma_image(&a), config.pyramid_levels);
        let cur = Pyramid::build(&luma_image(&b), config.pyramid_levels);
        let cpu = GradientSet::compute(cur.level(top), prev.level(top), None);
        let gpu_grad = p.arena().readback_gradients(p.gpu(), top).unwrap();

        for (name, want, got) in [("ix", &cpu.ix, &gpu_grad.ix), ("iy", &cpu.iy, &gpu_grad.iy), ("it", &cpu.it, &gpu_grad.it)] {
            for (x, y, v) in want.pixels() {
                let g = got.get(x, y);
                assert!((g - v).abs() < 1e-5, "{name} ({x}, {y}): gpu {g} cpu {v}");
            }
        }
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration"]
    fn inner_flow_matches_cpu() {
        let config = AnalyzerConfig::default();
        let p = pipeline(&config);
        let a = textured_frame(160, 90, 0.0, 0.0);
        let b = textured_frame(160, 90, 1.5, -0.5);
        p.run_frame(&a, 0, false, None).unwrap();
        p.run_frame(&b, 1, true, None).unwrap();

        let cpu = estimate_flow(
            &Pyramid::build(&luma_image(&a), config.pyramid_levels),
            &Pyramid::build(&luma_image(&b), config.pyramid_levels),
            &config.flow_params(),
        );
        let gpu_flow = p.arena().readback_flow(p.gpu(), 0).unwrap();

        // Float evaluation order differs, so a pixel sitting exactly on the
        // eigenvalue gate may go either way; require agreement almost
        // everywhere.
        let close = cpu
            .vectors()
            .zip(gpu_flow.vectors())
            .filter(|((cu, cv), (gu, gv))| (cu - gu).abs() < 1e-2 && (cv - gv).abs() < 1e-2)
            .count();
        let n = 160 * 90;
        assert!(close * 100 >= n * 99, "only {close}/{n} pixels agree");
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration"]
    fn inner_stats_match_cpu_accumulator() {
        let config = AnalyzerConfig::default();
        let p = pipeline(&config);
        p.run_frame(&textured_frame(160, 90, 0.0, 0.0), 0, false, None).unwrap();
        let raw = p
            .run_frame(&textured_frame(160, 90, 2.0, 1.0), 1, true, None)
            .unwrap()
            .expect("statistics on the second frame");
        let gpu_stats = StatisticsRecord::from(raw);
        let flow = p.arena().readback_flow(p.gpu(), 0).unwrap();
        let cpu_stats = accumulate(&flow, config.significance_threshold);

        assert_eq!(gpu_stats.pixel_count, 160 * 90);
        assert_eq!(gpu_stats.pixel_count, cpu_stats.pixel_count);
        let rel = (gpu_stats.sum_magnitude - cpu_stats.sum_magnitude).abs() / cpu_stats.sum_magnitude.max(1.0);
        assert!(rel < 1e-4, "sum_magnitude gpu {} cpu {}", gpu_stats.sum_magnitude, cpu_stats.sum_magnitude);
        assert!((gpu_stats.sum_vx - cpu_stats.sum_vx).abs() < 1.0);
        assert!((gpu_stats.sum_vy - cpu_stats.sum_vy).abs() < 1.0);
        assert!(gpu_stats.significant_count.abs_diff(cpu_stats.significant_count) <= 2);
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration"]
    fn inner_identical_frames_have_zero_statistics() {
        let config = AnalyzerConfig::default();
        let p = pipeline(&config);
        let frame = textured_frame(160, 90, 0.0, 0.0);
        p.run_frame(&frame, 0, false, None).unwrap();
        let raw = p.run_frame(&frame, 1, true, None).unwrap().unwrap();
        let rec = StatisticsRecord::from(raw);
        assert_eq!(rec.pixel_count, 160 * 90);
        assert_eq!(rec.sum_magnitude, 0.0);
        assert_eq!(rec.significant_count, 0);
        println!("GPU_TEST_OK");
    }

    // ---- outer subprocess wrappers ----------------------------------------

    macro_rules! gpu_test {
        ($outer:ident, $inner:ident) => {
            #[test]
            #[ignore = "requires a real GPU"]
            fn $outer() {
                let out = run_gpu_test(concat!("gpu::pipeline::tests::", stringify!($inner)));
                assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
            }
        };
    }

    gpu_test!(test_pyramid_matches_cpu, inner_pyramid_matches_cpu);
    gpu_test!(test_coarsest_gradients_match_cpu, inner_coarsest_gradients_match_cpu);
    gpu_test!(test_flow_matches_cpu, inner_flow_matches_cpu);
    gpu_test!(test_stats_match_cpu_accumulator, inner_stats_match_cpu_accumulator);
    gpu_test!(test_identical_frames_have_zero_statistics, inner_identical_frames_have_zero_statistics);
}
