// tests/test_stats.rs — Fixed-point accumulation is order independent.

use clip_motion::flow::FlowField;
use clip_motion::stats::{accumulate, FixedPointAccumulator};

fn vectors() -> Vec<(f32, f32)> {
    (0..500)
        .map(|i| {
            let t = i as f32 * 0.37;
            (3.0 * t.sin() - 0.4, 2.5 * (1.3 * t).cos() + 0.1)
        })
        .collect()
}

#[test]
fn accumulation_order_does_not_matter() {
    let vs = vectors();
    let mut forward = FixedPointAccumulator::new(0.5);
    vs.iter().for_each(|&(u, v)| forward.add(u, v));
    let mut backward = FixedPointAccumulator::new(0.5);
    vs.iter().rev().for_each(|&(u, v)| backward.add(u, v));
    assert_eq!(forward.to_raw(), backward.to_raw());
}

#[test]
fn merged_partials_equal_a_single_pass() {
    let vs = vectors();
    let mut whole = FixedPointAccumulator::new(0.5);
    vs.iter().for_each(|&(u, v)| whole.add(u, v));

    // Interleaved "workgroups" merged in reverse order.
    let mut parts: Vec<FixedPointAccumulator> = (0..7).map(|_| FixedPointAccumulator::new(0.5)).collect();
    for (i, &(u, v)) in vs.iter().enumerate() {
        parts[i % 7].add(u, v);
    }
    let mut merged = FixedPointAccumulator::new(0.5);
    for p in parts.iter().rev() {
        merged.merge(p);
    }
    assert_eq!(whole.to_raw(), merged.to_raw());
}

#[test]
fn field_statistics_of_a_uniform_translation() {
    let mut flow = FlowField::new(20, 10);
    for y in 0..10 {
        for x in 0..20 {
            flow.set(x, y, (0.6, -0.8));
        }
    }
    let rec = accumulate(&flow, 0.5);
    assert_eq!(rec.pixel_count, 200);
    assert_eq!(rec.significant_count, 200);
    assert!((rec.mean_magnitude() - 1.0).abs() < 1e-9);
    assert!((rec.sum_vx - 120.0).abs() < 1e-9);
    assert!((rec.sum_vy + 160.0).abs() < 1e-9);
    // All the weight lands in one direction bin.
    let nonzero = rec.histogram.iter().filter(|&&b| b > 0.0).count();
    assert_eq!(nonzero, 1);
    assert!((rec.histogram.iter().sum::<f64>() - 200.0).abs() < 1e-9);
}
