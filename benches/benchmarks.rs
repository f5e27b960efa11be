// benches/benchmarks.rs -- CPU reference stages and the classifier.
//
//   cargo bench --bench benchmarks
//
// The CPU path is the validation reference, not the production path; these
// numbers show how far a GPU-less fallback would be from frame rate.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use clip_motion::classify::classify;
use clip_motion::config::AnalyzerConfig;
use clip_motion::convert::luma_image;
use clip_motion::flow::estimate_flow;
use clip_motion::frame::ColorFrame;
use clip_motion::image::Image;
use clip_motion::pyramid::Pyramid;
use clip_motion::stats::accumulate;

// ============================================================
// Helpers
// ============================================================

/// Synthetic textured frame, content shifted by (dx, dy).
fn make_frame(w: usize, h: usize, dx: f32, dy: f32) -> ColorFrame {
    let img = Image::from_fn(w, h, |x, y| {
        let (x, y) = (x as f32 - dx, y as f32 - dy);
        (128.0 + 50.0 * (0.35 * x).sin() + 50.0 * (0.3 * y).cos()).round() as u8
    });
    ColorFrame::from_luma(&img)
}

// ============================================================
// Per-stage benchmarks
// ============================================================

fn bench_luma(c: &mut Criterion) {
    let frame = make_frame(160, 90, 0.0, 0.0);
    c.bench_function("luma/160x90", |b| b.iter(|| luma_image(&frame)));
}

fn bench_pyramid(c: &mut Criterion) {
    let luma = luma_image(&make_frame(160, 90, 0.0, 0.0));
    let mut group = c.benchmark_group("pyramid");
    for levels in [1usize, 3, 5] {
        group.bench_with_input(BenchmarkId::new("build_160x90", levels), &levels, |b, &l| {
            b.iter(|| Pyramid::build(&luma, l))
        });
    }
    group.finish();
}

fn bench_flow(c: &mut Criterion) {
    let mut group = c.benchmark_group("flow");
    for (w, h) in [(160usize, 90usize), (320, 180)] {
        let config = AnalyzerConfig { width: w as u32, height: h as u32, ..Default::default() };
        let prev = Pyramid::build(&luma_image(&make_frame(w, h, 0.0, 0.0)), config.pyramid_levels);
        let cur = Pyramid::build(&luma_image(&make_frame(w, h, 2.0, 1.0)), config.pyramid_levels);
        let params = config.flow_params();
        group.bench_function(BenchmarkId::new("estimate", format!("{w}x{h}")), |b| {
            b.iter(|| estimate_flow(&prev, &cur, &params))
        });
    }
    group.finish();
}

fn bench_stats_and_classify(c: &mut Criterion) {
    let config = AnalyzerConfig::default();
    let prev = Pyramid::build(&luma_image(&make_frame(160, 90, 0.0, 0.0)), config.pyramid_levels);
    let cur = Pyramid::build(&luma_image(&make_frame(160, 90, 2.0, 1.0)), config.pyramid_levels);
    let flow = estimate_flow(&prev, &cur, &config.flow_params());
    let stats = accumulate(&flow, config.significance_threshold);

    let mut group = c.benchmark_group("stats");
    group.bench_function("accumulate_160x90", |b| {
        b.iter(|| accumulate(&flow, config.significance_threshold))
    });
    group.bench_function("classify", |b| {
        b.iter(|| classify(&stats, config.total_pixels(), &config.classifier))
    });
    group.finish();
}

// ============================================================
// Full CPU pipeline: frame pair → MotionResult
// ============================================================

fn bench_pipeline(c: &mut Criterion) {
    let config = AnalyzerConfig::default();
    let a = make_frame(160, 90, 0.0, 0.0);
    let b_frame = make_frame(160, 90, 1.5, -0.5);
    c.bench_function("pipeline/cpu_160x90", |b| {
        b.iter(|| {
            let prev = Pyramid::build(&luma_image(&a), config.pyramid_levels);
            let cur = Pyramid::build(&luma_image(&b_frame), config.pyramid_levels);
            let flow = estimate_flow(&prev, &cur, &config.flow_params());
            let stats = accumulate(&flow, config.significance_threshold);
            classify(&stats, config.total_pixels(), &config.classifier)
        })
    });
}

criterion_group!(
    benches,
    bench_luma,
    bench_pyramid,
    bench_flow,
    bench_stats_and_classify,
    bench_pipeline,
);
criterion_main!(benches);
